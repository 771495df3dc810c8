//! Bindings Example - One property derived from another
//!
//! This example demonstrates:
//! - Declaring typed properties on two instances
//! - Binding `P.y` to `T.x * 2` over an explicit dependency list
//! - Completion running the first evaluation
//! - Dependency changes re-evaluating synchronously
//!
//! Run with: cargo run --example bindings

use elements_runtime::{
    bind, complete, create_element, declare, get, reset_runtime, set, subscribe,
    PropertyOptions, Result, TypeTag, Value,
};

fn main() -> Result<()> {
    // Reset to ensure clean state
    reset_runtime();

    println!("=== elements-runtime Bindings Example ===\n");

    let t = create_element()?;
    let p = create_element()?;
    declare(t, "x", PropertyOptions::new(TypeTag::Int))?;
    declare(p, "y", PropertyOptions::new(TypeTag::Int))?;

    bind(
        p,
        "y",
        move || Ok(Value::Int(get(t, "x")?.as_int().unwrap_or(0) * 2)),
        [(t, "x")],
    )?;

    subscribe(p, "y", |value| {
        println!("  yChanged -> {:?}", value);
        Ok(())
    })?;

    complete(t)?;
    complete(p)?;
    println!("After completion: P.y = {:?}", get(p, "y")?);

    println!("\nSetting T.x = 20");
    set(t, "x", Value::Int(20))?;
    println!("P.y = {:?}", get(p, "y")?);

    println!("\nSetting T.x = 20 again (unchanged, no notification)");
    set(t, "x", Value::Int(20))?;

    println!("\n=== Example Complete ===");
    Ok(())
}
