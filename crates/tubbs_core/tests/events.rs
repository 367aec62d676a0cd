use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tubbs_core::events::{self, Payload};
use tubbs_core::{Instance, Model, StoreResult};

fn users() -> Model {
    Model::builder()
        .class_name("user")
        .primary_key("id")
        .basic_properties(["username"])
        .build()
        .expect("model should build")
}

fn capture<T: 'static>(op: impl FnOnce(Box<dyn FnOnce(StoreResult<T>)>)) -> StoreResult<T> {
    let slot = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    op(Box::new(move |result| *sink.borrow_mut() = Some(result)));
    let result = slot.borrow_mut().take();
    result.expect("store callback should fire synchronously")
}

/// Records `(event, instance cid)` for every listed type-level event.
fn record_type_events(model: &Model, names: &[&str]) -> Rc<RefCell<Vec<(String, Option<String>)>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for name in names {
        let sink = Rc::clone(&seen);
        model.on(*name, move |notification| {
            sink.borrow_mut().push((
                notification.name().to_string(),
                notification
                    .instance
                    .as_ref()
                    .map(|instance| instance.cid().to_string()),
            ));
        });
    }
    seen
}

#[test]
fn every_instance_event_reaches_the_type_in_order() {
    let model = users();
    let seen = record_type_events(
        &model,
        &["new", "change", "change:username", "custom", "save"],
    );

    let user = model.create();
    user.set("username", json!("ada"), false);
    user.emit("custom", Payload::Args(vec![json!(42)]));
    capture(|cb| user.save(cb)).expect("save should succeed");

    let cid = Some(user.cid().to_string());
    let seen = seen.borrow();
    let events: Vec<&str> = seen.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        events,
        vec!["new", "change", "change:username", "custom", "change", "save"]
    );
    assert!(seen.iter().all(|(_, instance)| *instance == cid));
}

#[test]
fn lifecycle_events_fire_after_the_success_callback() {
    let model = users();
    let order = Rc::new(RefCell::new(Vec::new()));
    for event in [events::SAVE, events::FETCH, events::DELETE] {
        let sink = Rc::clone(&order);
        model.on(event, move |notification| {
            sink.borrow_mut().push(format!("type:{}", notification.name()));
        });
    }
    let user = model.create();
    for event in [events::SAVE, events::FETCH, events::DELETE] {
        let sink = Rc::clone(&order);
        user.on(event, move |notification| {
            sink.borrow_mut().push(format!("instance:{}", notification.name));
        });
    }

    for step in ["save", "fetch", "delete"] {
        let sink = Rc::clone(&order);
        let cb = move |result: StoreResult<Instance>| {
            assert!(result.is_ok());
            sink.borrow_mut().push(format!("callback:{step}"));
        };
        match step {
            "save" => user.save(cb),
            "fetch" => user.fetch(cb),
            _ => user.delete(cb),
        }
    }

    assert_eq!(
        *order.borrow(),
        vec![
            "callback:save",
            "instance:save",
            "type:save",
            "callback:fetch",
            "instance:fetch",
            "type:fetch",
            "callback:delete",
            "instance:delete",
            "type:delete",
        ]
    );
}

#[test]
fn failed_operations_emit_no_lifecycle_event() {
    let model = users();
    let seen = record_type_events(&model, &["delete"]);
    let user = model.create();

    let result = capture(|cb| user.delete(cb));

    assert!(result.is_err());
    assert!(seen.borrow().is_empty());
}

#[test]
fn type_level_emit_has_no_instance_attached() {
    let model = users();
    let seen = record_type_events(&model, &["reindex"]);

    assert_eq!(model.emit("reindex", Payload::Empty), 1);
    assert_eq!(*seen.borrow(), vec![("reindex".to_string(), None)]);
}

#[test]
fn once_and_off_control_type_listeners() {
    let model = users();
    let count = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&count);
    model.once(events::NEW, move |_| *counter.borrow_mut() += 1);
    let counter = Rc::clone(&count);
    let id = model.on(events::NEW, move |_| *counter.borrow_mut() += 10);

    model.create();
    assert!(model.off(id));
    model.create();

    assert_eq!(*count.borrow(), 11);
}

#[test]
fn listeners_may_write_fields_reentrantly() {
    let model = Model::builder()
        .basic_properties(["username", "slug"])
        .build()
        .expect("model should build");
    model.on("change:username", |notification| {
        if let (Some(user), Some(change)) = (&notification.instance, notification.change()) {
            let slug = change
                .new_value
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .map(Value::from)
                .unwrap_or(Value::Null);
            user.set("slug", slug, false);
        }
    });

    let user = model.create();
    user.set("username", json!("Ada"), false);

    assert_eq!(user.get("slug"), Some(json!("ada")));
}
