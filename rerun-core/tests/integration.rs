//! Integration Tests for the Rerun Core
//!
//! These tests drive whole apps through the public API: sessions, events,
//! caches and the render trees that come back.

use std::convert::Infallible;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rerun_core::cache::ManualClock;
use rerun_core::{
    App, CacheRegistry, Callback, Element, Error, Event, RunStatus, RuntimeConfig, WidgetId,
    WidgetOptions,
};

fn counted<A: 'static, T: 'static>(
    counter: &Arc<AtomicI32>,
    f: impl Fn(&A) -> T + Send + Sync + 'static,
) -> impl Fn(&A) -> Result<T, Infallible> + Send + Sync + 'static {
    let counter = counter.clone();
    move |args: &A| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(f(args))
    }
}

fn markdown(body: &str) -> Element {
    Element::Markdown { body: body.into() }
}

/// Test that a value written in one run is read back in later runs.
#[test]
fn state_persists_across_runs() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        if !ctx.state().has("greeting") {
            ctx.state_mut().set("greeting", "hello")?;
        } else {
            let greeting: String = ctx.state().get_as("greeting")?;
            ctx.write(&greeting)?;
        }
        Ok(())
    });
    let id = app.open_session();

    assert!(app.handle(id, None).unwrap().tree.is_empty());
    for _ in 0..3 {
        let outcome = app.handle(id, Some(Event::Rerun)).unwrap();
        assert_eq!(outcome.tree.elements(), &[markdown("hello")]);
    }
}

/// Test the counter scenario: three clicks, no reset in between.
#[test]
fn counter_increments_on_each_click() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("counter", 0)?;
        let increment = Callback::new(|state, args| {
            let by = args.first().and_then(|v| v.as_i64()).unwrap_or(1);
            state.update::<i64, _>("counter", |c| c + by)
        })
        .with_args([serde_json::json!(1)]);
        ctx.button("Increment", WidgetOptions::new().key("increment").on_click(increment))?;

        let counter: i64 = ctx.state().get_as("counter")?;
        ctx.write(&format!("Counter = {counter}"))
    });
    let id = app.open_session();

    let first = app.handle(id, None).unwrap();
    assert_eq!(first.tree.last(), Some(&markdown("Counter = 0")));

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            app.handle(id, Some(Event::click(WidgetId::explicit("increment"))))
                .unwrap(),
        );
    }

    let last = last.unwrap();
    assert_eq!(last.status, RunStatus::Completed);
    assert_eq!(last.tree.last(), Some(&markdown("Counter = 3")));
    assert_eq!(
        app.session(id).unwrap().lock().state().get_as::<i64>("counter").unwrap(),
        3
    );
}

/// Test that a stop after two elements yields exactly those two.
#[test]
fn stop_truncates_the_render_tree() {
    let reached = Arc::new(AtomicI32::new(0));
    let reached_clone = reached.clone();
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), move |ctx| {
        ctx.title("Report");
        ctx.text("Loading is disabled");
        ctx.stop()?;
        reached_clone.fetch_add(1, Ordering::SeqCst);
        ctx.text("never shown");
        Ok(())
    });
    let id = app.open_session();

    let outcome = app.handle(id, None).unwrap();
    assert_eq!(outcome.status, RunStatus::Stopped);
    assert_eq!(outcome.tree.len(), 2);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

/// Test that state written before a stop persists.
#[test]
fn writes_before_stop_persist() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("visits", 0)?;
        ctx.state_mut().update::<i64, _>("visits", |v| v + 1)?;
        ctx.stop()
    });
    let id = app.open_session();
    app.handle(id, None).unwrap();
    app.handle(id, None).unwrap();

    let visits = app.session(id).unwrap().lock().state().get_as::<i64>("visits").unwrap();
    assert_eq!(visits, 2);
}

/// Test that a rerun request starts over with the updated state.
#[test]
fn rerun_request_restarts_with_new_state() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("step", 0)?;
        let step: i64 = ctx.state().get_as("step")?;
        ctx.write(&format!("step {step}"))?;
        if step < 2 {
            ctx.state_mut().set("step", step + 1)?;
            ctx.rerun()?;
        }
        Ok(())
    });
    let id = app.open_session();

    let outcome = app.handle(id, None).unwrap();
    assert_eq!(outcome.runs, 3);
    assert_eq!(outcome.tree.elements(), &[markdown("step 2")]);
}

/// Test that a failing script surfaces the failure and keeps prior state.
#[test]
fn failure_is_shown_and_state_is_kept() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("attempts", 0)?;
        ctx.text("before");
        let divisor = ctx.number_input("Divisor", -10.0, 10.0, 1.0, WidgetOptions::new().key("divisor"))?;
        if divisor == 0.0 {
            ctx.state_mut().update::<i64, _>("attempts", |a| a + 1)?;
            return Err(Error::script("division by zero"));
        }
        ctx.write(&(100.0 / divisor))
    });
    let id = app.open_session();
    app.handle(id, None).unwrap();

    let event = Event::widget_changed(WidgetId::explicit("divisor"), 0.0).unwrap();
    let outcome = app.handle(id, Some(event)).unwrap();

    assert_eq!(outcome.status, RunStatus::Failed("division by zero".into()));
    assert_eq!(outcome.tree.len(), 3);
    assert_eq!(
        outcome.tree.last(),
        Some(&Element::Exception {
            message: "division by zero".into()
        })
    );

    // The session is still usable and its state is as before the failure
    let handle = app.session(id).unwrap();
    assert_eq!(handle.lock().state().get_as::<i64>("attempts").unwrap(), 0);
    assert_eq!(handle.lock().state().get_as::<f64>("divisor").unwrap(), 0.0);
    drop(handle);

    let event = Event::widget_changed(WidgetId::explicit("divisor"), 4.0).unwrap();
    let outcome = app.handle(id, Some(event)).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.tree.last(),
        Some(&Element::Data {
            value: serde_json::json!(25.0)
        })
    );
}

/// Test that two calls within the ttl compute once.
#[test]
fn data_cache_computes_once_within_ttl() {
    let clock = Arc::new(ManualClock::new());
    let caches = CacheRegistry::with_clock(clock.clone());
    let calls = Arc::new(AtomicI32::new(0));
    let square = caches.cache_data_ttl("square", Duration::from_secs(60), counted(&calls, |x: &i64| x * x));

    assert_eq!(square.call(&7).unwrap(), 49);
    clock.advance(Duration::from_secs(30));
    assert_eq!(square.call(&7).unwrap(), 49);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(square.call(&8).unwrap(), 64);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test the data-cache expiry scenario at t=0, 0.5 and 1.5 with ttl=1.
#[test]
fn data_cache_expires_after_ttl() {
    let clock = Arc::new(ManualClock::new());
    let caches = CacheRegistry::with_clock(clock.clone());
    let calls = Arc::new(AtomicI32::new(0));
    let f = caches.cache_data_ttl("f", Duration::from_secs(1), counted(&calls, |x: &i32| x + 1));

    assert_eq!(f.call(&5).unwrap(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first_stored = f.created_at(&5).unwrap().unwrap();

    clock.set(Duration::from_millis(500));
    assert_eq!(f.call(&5).unwrap(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.set(Duration::from_millis(1500));
    assert_eq!(f.call(&5).unwrap(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(f.created_at(&5).unwrap().unwrap() > first_stored);
}

/// Test that sessions share one resource instance.
#[test]
fn resource_is_identical_across_sessions() {
    struct Model {
        name: String,
    }

    let caches = CacheRegistry::new();
    let calls = Arc::new(AtomicI32::new(0));
    let model = caches.cache_resource(
        "load_model",
        counted(&calls, |name: &String| Model { name: name.clone() }),
    );

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let app = App::new(RuntimeConfig::new(), caches, move |ctx| {
        let model = model.call(&"small".to_string())?;
        ctx.text(format!("model {}", model.name));
        seen_clone.lock().push(model);
        Ok(())
    });

    let a = app.open_session();
    let b = app.open_session();
    app.handle(a, None).unwrap();
    app.handle(b, None).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(Arc::ptr_eq(&seen[0], &seen[1]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test that clearing a cache forces a recompute despite remaining ttl.
#[test]
fn clear_forces_recompute() {
    let caches = CacheRegistry::new();
    let calls = Arc::new(AtomicI32::new(0));
    let f = caches.cache_data_ttl("f", Duration::from_secs(3600), counted(&calls, |x: &i32| x * 10));
    let r = caches.cache_resource("r", counted(&calls, |x: &i32| x * 100));

    f.call(&1).unwrap();
    r.call(&1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    f.clear();
    f.call(&1).unwrap();
    r.call(&1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    caches.clear_all();
    f.call(&1).unwrap();
    r.call(&1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// Test that values from a data cache are independent copies.
#[test]
fn data_cache_hands_out_copies() {
    let caches = CacheRegistry::new();
    let rows = caches.cache_data(
        "rows",
        Default::default(),
        |n: &usize| -> Result<Vec<i32>, Infallible> { Ok((0..*n as i32).collect()) },
    );

    let mut first = rows.call(&3).unwrap();
    first.push(99);
    assert_eq!(rows.call(&3).unwrap(), vec![0, 1, 2]);
}

/// Test that a failing computation reaches the script as a run failure.
#[test]
fn cache_failure_fails_the_run() {
    let caches = CacheRegistry::new();
    let load = caches.cache_data("load", Default::default(), |path: &String| {
        if path.is_empty() {
            Err("empty path")
        } else {
            Ok(path.len())
        }
    });
    let app = App::new(RuntimeConfig::new(), caches, move |ctx| {
        let path = ctx.text_input("Path", "", WidgetOptions::new().key("path"))?;
        let size = load.call(&path)?;
        ctx.write(&size)
    });
    let id = app.open_session();

    let outcome = app.handle(id, None).unwrap();
    assert!(matches!(outcome.status, RunStatus::Failed(ref msg) if msg.contains("empty path")));

    let event = Event::widget_changed(WidgetId::explicit("path"), "data.csv").unwrap();
    let outcome = app.handle(id, Some(event)).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
}

/// Test that a callback sees the new value and runs before the body.
#[test]
fn callback_fires_before_the_body() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("log", Vec::<String>::new())?;
        ctx.state_mut().update::<Vec<String>, _>("log", |mut log| {
            log.push("body".into());
            log
        })?;

        let on_change = Callback::new(|state, _| {
            let choice: String = state.get_as("color")?;
            state.update::<Vec<String>, _>("log", |mut log| {
                log.push(format!("callback {choice}"));
                log
            })
        });
        ctx.selectbox("Color", &["red", "green"], 0, WidgetOptions::new().key("color").on_change(on_change))?;
        Ok(())
    });
    let id = app.open_session();
    app.handle(id, None).unwrap();

    let event = Event::widget_changed(WidgetId::explicit("color"), "green").unwrap();
    app.handle(id, Some(event)).unwrap();

    let log: Vec<String> = app.session(id).unwrap().lock().state().get_as("log").unwrap();
    assert_eq!(log, vec!["body", "callback green", "body"]);
}

/// Test that sessions run concurrently without sharing state.
#[test]
fn concurrent_sessions_stay_isolated() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.state_mut().init("count", 0)?;
        if ctx.button("Add", WidgetOptions::new().key("add"))? {
            ctx.state_mut().update::<i64, _>("count", |c| c + 1)?;
        }
        Ok(())
    });

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let app = app.clone();
            thread::spawn(move || {
                let id = app.open_session();
                app.handle(id, None).unwrap();
                for _ in 0..=i {
                    app.handle(id, Some(Event::click(WidgetId::explicit("add")))).unwrap();
                }
                let count = app.session(id).unwrap().lock().state().get_as::<i64>("count").unwrap();
                (i, count)
            })
        })
        .collect();

    for handle in handles {
        let (i, count) = handle.join().unwrap();
        assert_eq!(count, i + 1);
    }
    assert_eq!(app.sessions().len(), 4);
}

/// Test that widgets derive stable ids when no key is given.
#[test]
fn implicit_widget_ids_are_stable_across_runs() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        let volume = ctx.slider("Volume", 0, 10, 5, WidgetOptions::new())?;
        ctx.write(&volume)
    });
    let id = app.open_session();
    let first = app.handle(id, None).unwrap();

    let Some(Element::Widget { id: widget_id, .. }) = first.tree.elements().first().cloned() else {
        panic!("expected a widget element first");
    };
    assert!(widget_id.is_implicit());

    let event = Event::widget_changed(widget_id, 8).unwrap();
    let outcome = app.handle(id, Some(event)).unwrap();
    assert_eq!(
        outcome.tree.last(),
        Some(&Element::Data {
            value: serde_json::json!(8)
        })
    );
}

/// Test that the same implicit widget twice in one run is rejected.
#[test]
fn duplicate_widgets_fail_the_run() {
    let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
        ctx.checkbox("Agree", false, WidgetOptions::new())?;
        ctx.checkbox("Agree", false, WidgetOptions::new())?;
        Ok(())
    });
    let id = app.open_session();

    let outcome = app.handle(id, None).unwrap();
    assert!(matches!(outcome.status, RunStatus::Failed(ref msg) if msg.contains("duplicate widget id")));
}

/// Test that arguments differing only in which optional field is set get
/// their own entries.
#[test]
fn optional_fields_keep_cache_keys_apart() {
    #[derive(serde::Serialize)]
    struct Query {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i32>,
    }

    let caches = CacheRegistry::new();
    let describe = caches.cache_data("describe", Default::default(), |q: &Query| {
        Ok::<_, Infallible>(format!("min={:?} max={:?}", q.min, q.max))
    });

    let low = describe.call(&Query { min: Some(5), max: None }).unwrap();
    let high = describe.call(&Query { min: None, max: Some(5) }).unwrap();
    assert_eq!(low, "min=Some(5) max=None");
    assert_eq!(high, "min=None max=Some(5)");
}

fn order_form(log: Arc<parking_lot::Mutex<Vec<String>>>) -> App {
    App::new(RuntimeConfig::new(), CacheRegistry::new(), move |ctx| {
        log.lock().push("run".into());
        ctx.form("order", |ctx| {
            ctx.text_input("Item", "", WidgetOptions::new().key("item"))?;
            ctx.number_input("Quantity", 1.0, 100.0, 1.0, WidgetOptions::new().key("quantity"))?;

            let log_place = log.clone();
            let place = Callback::new(move |state, _| {
                let item: String = state.get_as("item")?;
                let quantity: f64 = state.get_as("quantity")?;
                log_place.lock().push(format!("place {quantity} {item}"));
                Ok(())
            });
            let log_save = log.clone();
            let save = Callback::new(move |_, _| {
                log_save.lock().push("save draft".into());
                Ok(())
            });
            ctx.form_submit_button("Place order", WidgetOptions::new().key("place").on_click(place))?;
            ctx.form_submit_button("Save draft", WidgetOptions::new().key("save").on_click(save))?;
            Ok(())
        })?;

        let item: String = ctx.state().get_as("item")?;
        ctx.write(&format!("Item: {item}"))
    })
}

/// Test that a submission commits every value and runs the script once.
#[test]
fn form_submission_commits_all_values_in_one_run() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let app = order_form(log.clone());
    let id = app.open_session();
    app.handle(id, None).unwrap();

    let submit = Event::form_submitted(
        WidgetId::explicit("place"),
        [
            (WidgetId::explicit("item"), serde_json::json!("tea")),
            (WidgetId::explicit("quantity"), serde_json::json!(3.0)),
        ],
    );
    let outcome = app.handle(id, Some(submit)).unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.runs, 1);
    assert_eq!(outcome.tree.last(), Some(&markdown("Item: tea")));
    assert_eq!(*log.lock(), vec!["run", "place 3 tea", "run"]);

    // Submit buttons are triggers: false again after the run
    let handle = app.session(id).unwrap();
    assert!(!handle.lock().state().get_as::<bool>("place").unwrap());
}

/// Test that each submit button fires only its own callback.
#[test]
fn each_submit_button_fires_its_own_callback() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let app = order_form(log.clone());
    let id = app.open_session();
    app.handle(id, None).unwrap();

    let draft = Event::form_submitted(
        WidgetId::explicit("save"),
        [(WidgetId::explicit("item"), serde_json::json!("coffee"))],
    );
    app.handle(id, Some(draft)).unwrap();

    assert_eq!(*log.lock(), vec!["run", "save draft", "run"]);
    assert_eq!(
        app.session(id).unwrap().lock().state().get_as::<String>("item").unwrap(),
        "coffee"
    );
}

/// Test that editing a form member alone does not run the script.
#[test]
fn form_member_edits_wait_for_submit() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let app = order_form(log.clone());
    let id = app.open_session();
    app.handle(id, None).unwrap();

    let typed = Event::widget_changed(WidgetId::explicit("item"), "tea").unwrap();
    let err = app.handle(id, Some(typed)).unwrap_err();

    assert!(matches!(err, Error::DeferredWidget(_)));
    assert_eq!(*log.lock(), vec!["run"]);
}
