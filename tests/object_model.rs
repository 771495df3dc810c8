//! End-to-end tests for the component object model.
//!
//! Each test drives the public API the way compiled component code does:
//! construct, declare, bind, compose, complete, then mutate.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use elements_runtime::*;

// =============================================================================
// Helpers
// =============================================================================

/// `T { int x }` and `P { int y: T.x * 2 }`, both completed.
fn doubled_pair() -> (InstanceId, InstanceId) {
    reset_runtime();
    let t = create_element().unwrap();
    let p = create_element().unwrap();
    declare(t, "x", PropertyOptions::new(TypeTag::Int)).unwrap();
    declare(p, "y", PropertyOptions::new(TypeTag::Int)).unwrap();
    bind(
        p,
        "y",
        move || Ok(Value::Int(get(t, "x")?.as_int().unwrap_or(0) * 2)),
        [(t, "x")],
    )
    .unwrap();
    complete(t).unwrap();
    complete(p).unwrap();
    (t, p)
}

fn counter() -> (Rc<Cell<usize>>, impl Fn(&Value) -> Result<()> + 'static) {
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    (hits, move |_: &Value| {
        counter.set(counter.get() + 1);
        Ok(())
    })
}

// =============================================================================
// Bindings
// =============================================================================

#[test]
fn test_binding_follows_dependency() {
    let (t, p) = doubled_pair();
    assert_eq!(get(p, "y").unwrap(), Value::Int(0));

    set(t, "x", Value::Int(20)).unwrap();
    assert_eq!(get(p, "y").unwrap(), Value::Int(40));
}

#[test]
fn test_subscriber_invoked_exactly_once_per_change() {
    let (t, p) = doubled_pair();
    let (hits, listener) = counter();
    subscribe(p, "y", listener).unwrap();

    set(t, "x", Value::Int(20)).unwrap();
    assert_eq!(hits.get(), 1);

    // Same value: no write reaches y
    set(t, "x", Value::Int(20)).unwrap();
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_self_dependent_binding_terminates() {
    reset_runtime();
    let item = create_element().unwrap();
    declare(item, "n", PropertyOptions::new(TypeTag::Int)).unwrap();

    let runs = Rc::new(Cell::new(0));
    let count = runs.clone();
    bind(
        item,
        "n",
        move || {
            count.set(count.get() + 1);
            Ok(Value::Int(get(item, "n")?.as_int().unwrap_or(0) + 1))
        },
        [(item, "n")],
    )
    .unwrap();

    complete(item).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(get(item, "n").unwrap(), Value::Int(2));
}

#[test]
fn test_cascading_bindings() {
    reset_runtime();
    let a = create_element().unwrap();
    let b = create_element().unwrap();
    let c = create_element().unwrap();
    declare(a, "v", PropertyOptions::new(TypeTag::Int)).unwrap();
    declare(b, "v", PropertyOptions::new(TypeTag::Int)).unwrap();
    declare(c, "label", PropertyOptions::new(TypeTag::String)).unwrap();

    bind(b, "v", move || Ok(Value::Int(get(a, "v")?.as_int().unwrap_or(0) + 1)), [(a, "v")])
        .unwrap();
    bind(c, "label", move || Ok(Value::from(format!("b={:?}", get(b, "v")?.as_int()))), [(b, "v")])
        .unwrap();
    for instance in [a, b, c] {
        complete(instance).unwrap();
    }

    set(a, "v", Value::Int(41)).unwrap();
    assert_eq!(get(b, "v").unwrap(), Value::Int(42));
    assert_eq!(get(c, "label").unwrap(), Value::from("b=Some(42)"));
}

#[test]
fn test_bad_evaluator_result_is_rejected() {
    let (t, _) = doubled_pair();
    let q = create_element().unwrap();
    declare(q, "flag", PropertyOptions::new(TypeTag::Bool)).unwrap();
    complete(q).unwrap();

    let result = bind(q, "flag", move || get(t, "x"), [(t, "x")]);
    assert!(matches!(result, Err(ElementError::TypeMismatch { .. })));
    assert_eq!(get(q, "flag").unwrap(), Value::Bool(false));
}

// =============================================================================
// Assignment Policies
// =============================================================================

#[test]
fn test_manual_assignment_keeps_binding_by_default() {
    let (t, p) = doubled_pair();

    set(p, "y", Value::Int(7)).unwrap();
    assert_eq!(get(p, "y").unwrap(), Value::Int(7));
    assert!(has_binding(p, "y").unwrap());

    set(t, "x", Value::Int(5)).unwrap();
    assert_eq!(get(p, "y").unwrap(), Value::Int(10));
}

#[test]
fn test_manual_assignment_detaches_binding() {
    let (t, p) = doubled_pair();
    configure(RuntimeConfig {
        assignment_policy: AssignmentPolicy::DetachBinding,
        ..RuntimeConfig::default()
    });

    set(p, "y", Value::Int(7)).unwrap();
    assert!(!has_binding(p, "y").unwrap());

    set(t, "x", Value::Int(5)).unwrap();
    assert_eq!(get(p, "y").unwrap(), Value::Int(7));
    assert_eq!(listener_count(t, "xChanged").unwrap(), 0);
}

// =============================================================================
// Components and Ids
// =============================================================================

/// `T { id: twenty; int x: 20 }`
fn twenty_type() -> ComponentType {
    ComponentType::new("T", |this| {
        register_id(this, "twenty", this)?;
        declare(this, "x", PropertyOptions::new(TypeTag::Int))?;
        set(this, "x", Value::Int(20))
    })
}

#[test]
fn test_component_property_instantiation() {
    reset_runtime();
    let t = twenty_type();

    let observed = Rc::new(RefCell::new(None));
    let seen = observed.clone();
    let test = ComponentType::new("ParserTest06", move |this| {
        declare(this, "ElemProp", PropertyOptions::new(TypeTag::Component))?;
        set(this, "ElemProp", Value::Component(t.clone()))?;

        let holder = create_element()?;
        set_parent(holder, this)?;
        declare(holder, "y", PropertyOptions::new(""))?;
        let seen = seen.clone();
        bind(
            holder,
            "y",
            move || {
                let made = instantiate_property(this, "ElemProp")?;
                // Completion has already run on the new instance
                *seen.borrow_mut() = Some((state(made)?, lookup_id(made, "twenty")?));
                Ok(Value::Instance(made))
            },
            [(this, "ElemProp")],
        )?;
        assign_children(this, &[holder])
    });

    let root = construct(&test).unwrap();
    complete(root).unwrap();

    let holder = children(root).unwrap()[0];
    let made = get(holder, "y").unwrap().as_instance().unwrap();
    assert_eq!(type_name(made).unwrap(), "T");
    assert_eq!(get(made, "x").unwrap(), Value::Int(20));
    assert_eq!(lookup_id(made, "twenty").unwrap(), Some(made));
    assert_eq!(
        *observed.borrow(),
        Some((LifecycleState::Completed, Some(made)))
    );

    // The instantiated component is private to its own scope
    assert_eq!(lookup_id(root, "twenty").unwrap(), None);
}

#[test]
fn test_instantiated_component_is_owned_by_holder() {
    reset_runtime();
    let holder = create_element().unwrap();
    declare(holder, "delegate", PropertyOptions::new(TypeTag::Component)).unwrap();
    declare(holder, "item", PropertyOptions::new("T")).unwrap();
    set(holder, "delegate", Value::Component(twenty_type())).unwrap();
    complete(holder).unwrap();

    let made = instantiate_property(holder, "delegate").unwrap();
    let destroyed = Rc::new(Cell::new(false));
    let flag = destroyed.clone();
    on_destroy(made, move || flag.set(true));
    set(holder, "item", Value::Instance(made)).unwrap();

    release(holder);
    assert!(destroyed.get());
    assert!(!is_alive(made));
    assert_eq!(instance_count(), 0);
}

#[test]
fn test_replaced_instance_is_released() {
    reset_runtime();
    let holder = create_element().unwrap();
    declare(holder, "delegate", PropertyOptions::new(TypeTag::Component)).unwrap();
    declare(holder, "tick", PropertyOptions::new(TypeTag::Int)).unwrap();
    declare(holder, "made", PropertyOptions::new("T")).unwrap();
    set(holder, "delegate", Value::Component(twenty_type())).unwrap();
    bind(
        holder,
        "made",
        move || Ok(Value::Instance(instantiate_property(holder, "delegate")?)),
        [(holder, "tick")],
    )
    .unwrap();
    complete(holder).unwrap();

    let first = get(holder, "made").unwrap().as_instance().unwrap();
    assert_eq!(instance_count(), 2);

    for tick in 1..=5 {
        set(holder, "tick", Value::Int(tick)).unwrap();
    }

    // Only the holder and the latest instance survive
    assert_eq!(instance_count(), 2);
    assert!(!is_alive(first));
    let current = get(holder, "made").unwrap().as_instance().unwrap();
    assert!(is_alive(current));

    release(holder);
    assert_eq!(instance_count(), 0);
}

#[test]
fn test_replacing_a_plain_reference_keeps_the_instance() {
    reset_runtime();
    let holder = create_element().unwrap();
    declare(holder, "target", PropertyOptions::new("Element")).unwrap();
    let first = create_element().unwrap();
    let second = create_element().unwrap();

    set(holder, "target", Value::Instance(first)).unwrap();
    set(holder, "target", Value::Instance(second)).unwrap();

    assert!(is_alive(first));
    assert_eq!(get(holder, "target").unwrap(), Value::Instance(second));
}

#[test]
fn test_id_scopes() {
    reset_runtime();

    // Card { Row { Label { id: caption } }  Icon { id: icon } }
    let card = ComponentType::new("Card", |this| {
        let row = create_element()?;
        set_parent(row, this)?;
        let label = create_element()?;
        set_parent(label, row)?;
        expose_id(label, "caption")?;
        assign_children(row, &[label])?;

        let icon = create_element()?;
        set_parent(icon, this)?;
        expose_id(icon, "icon")?;
        assign_children(this, &[row, icon])
    });
    let page = ComponentType::new("Page", move |this| {
        let first = construct(&card)?;
        set_parent(first, this)?;
        expose_id(first, "first")?;
        let second = construct(&card)?;
        set_parent(second, this)?;
        expose_id(second, "second")?;
        assign_children(this, &[first, second])
    });

    let root = construct(&page).unwrap();
    complete(root).unwrap();

    let page_ids: Vec<String> = ids(root).unwrap().keys().cloned().collect();
    assert_eq!(page_ids, vec!["first", "second"]);

    let first = lookup_id(root, "first").unwrap().unwrap();
    let second = lookup_id(root, "second").unwrap().unwrap();
    let first_caption = lookup_id(first, "caption").unwrap().unwrap();
    let second_caption = lookup_id(second, "caption").unwrap().unwrap();
    assert_ne!(first_caption, second_caption);
    assert_eq!(lookup_id(first, "icon").unwrap(), Some(children(first).unwrap()[1]));
}

#[test]
fn test_ids_require_completion() {
    reset_runtime();
    let root = construct(&twenty_type()).unwrap();

    assert!(matches!(
        lookup_id(root, "twenty"),
        Err(ElementError::PrematureAccess { .. })
    ));
    complete(root).unwrap();
    assert_eq!(lookup_id(root, "twenty").unwrap(), Some(root));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_binding_to_later_sibling_resolves_at_completion() {
    reset_runtime();
    let list = ComponentType::new("List", |this| {
        let header = create_element()?;
        set_parent(header, this)?;
        declare(header, "count", PropertyOptions::new(TypeTag::Int))?;

        let body = create_element()?;
        set_parent(body, this)?;
        declare(body, "rows", PropertyOptions::new(TypeTag::Int))?;
        set(body, "rows", Value::Int(12))?;

        bind(header, "count", move || get(body, "rows"), [(body, "rows")])?;
        expose_id(header, "header")?;
        expose_id(body, "body")?;
        assign_children(this, &[header, body])
    });

    let root = construct(&list).unwrap();
    let header = children(root).unwrap()[0];
    assert!(matches!(
        get(header, "count"),
        Err(ElementError::PrematureAccess { .. })
    ));

    complete(root).unwrap();
    assert_eq!(get(header, "count").unwrap(), Value::Int(12));

    let body = lookup_id(root, "body").unwrap().unwrap();
    set(body, "rows", Value::Int(13)).unwrap();
    assert_eq!(get(header, "count").unwrap(), Value::Int(13));
}

#[test]
fn test_release_detaches_bindings() {
    let (t, p) = doubled_pair();
    assert_eq!(binding_count(), 1);

    release(p);
    assert_eq!(binding_count(), 0);
    assert_eq!(listener_count(t, "xChanged").unwrap(), 0);

    // Writing the former dependency is harmless
    set(t, "x", Value::Int(3)).unwrap();
}

// =============================================================================
// Events
// =============================================================================

#[test]
fn test_declared_event_checks_arguments() {
    reset_runtime();
    let button = create_element().unwrap();
    add_event(button, "clicked", [(TypeTag::Int, "count")]).unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let log = received.clone();
    on(button, "clicked", move |args| {
        log.borrow_mut().extend(args.iter().cloned());
        Ok(())
    })
    .unwrap();

    emit(button, "clicked", &[Value::Int(2)]).unwrap();
    assert!(matches!(
        emit(button, "clicked", &[]),
        Err(ElementError::ArgumentCount { expected: 1, found: 0, .. })
    ));
    assert!(matches!(
        emit(button, "clicked", &[Value::from("two")]),
        Err(ElementError::TypeMismatch { .. })
    ));
    assert!(matches!(
        emit(button, "pressed", &[]),
        Err(ElementError::UnknownEvent { .. })
    ));

    assert_eq!(*received.borrow(), vec![Value::Int(2)]);
}
