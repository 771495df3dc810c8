//! Component Property Example - Instantiating a component held in a property
//!
//! Builds the equivalent of:
//!
//! ```text
//! component T   { id: twenty; int x: 20 }
//! component Test {
//!     component ElemProp: T
//!     Element { var y: parent.ElemProp.create() }
//! }
//! ```
//!
//! Run with: cargo run --example component_property

use elements_runtime::{
    assign_children, bind, children, complete, construct, create_element, declare, get,
    ids, instance_count, instantiate_property, lookup_id, register_id, release, reset_runtime,
    set, set_parent, type_name, ComponentType, PropertyOptions, Result, TypeTag, Value,
};

fn main() -> Result<()> {
    reset_runtime();

    println!("=== elements-runtime Component Property Example ===\n");

    let t = ComponentType::new("T", |this| {
        register_id(this, "twenty", this)?;
        declare(this, "x", PropertyOptions::new(TypeTag::Int))?;
        set(this, "x", Value::Int(20))
    });

    let test = ComponentType::new("Test", move |this| {
        declare(this, "ElemProp", PropertyOptions::new(TypeTag::Component))?;
        set(this, "ElemProp", Value::Component(t.clone()))?;

        let holder = create_element()?;
        set_parent(holder, this)?;
        declare(holder, "y", PropertyOptions::new(TypeTag::Var))?;
        bind(
            holder,
            "y",
            move || Ok(Value::Instance(instantiate_property(this, "ElemProp")?)),
            [(this, "ElemProp")],
        )?;

        assign_children(this, &[holder])
    });

    let root = construct(&test)?;
    complete(root)?;

    let holder = children(root)?[0];
    let made = get(holder, "y")?.as_instance();
    println!("Root: {} ({})", root, type_name(root)?);
    println!("Holder y: {:?}", made);

    if let Some(made) = made {
        println!("  type: {}", type_name(made)?);
        println!("  x: {:?}", get(made, "x")?);
        println!("  ids: {:?}", ids(made)?);
        println!("  twenty -> {:?}", lookup_id(made, "twenty")?);
    }

    println!("\nLive instances: {}", instance_count());
    release(root);
    println!("After release: {}", instance_count());

    println!("\n=== Example Complete ===");
    Ok(())
}
