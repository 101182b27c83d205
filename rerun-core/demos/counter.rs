//! Counter app driven from the terminal.
//!
//! Run with `RUST_LOG=rerun_core=debug` to watch runs and cache activity.

use std::convert::Infallible;
use std::time::Duration;

use rerun_core::{
    App, CacheRegistry, Callback, Element, Event, RenderTree, RuntimeConfig, WidgetId,
    WidgetOptions,
};
use tracing_subscriber::EnvFilter;

fn print_tree(tree: &RenderTree) {
    for element in tree {
        match element {
            Element::Title { body } => println!("# {body}"),
            Element::Markdown { body } | Element::Text { body } => println!("{body}"),
            Element::Widget { label, value, .. } => println!("[{label}: {value}]"),
            Element::Exception { message } => println!("!! {message}"),
            other => println!("{other:?}"),
        }
    }
    println!();
}

fn main() -> rerun_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let caches = CacheRegistry::new();
    let greeting = caches.cache_data_ttl("greeting", Duration::from_secs(60), |name: &String| {
        Ok::<_, Infallible>(format!("Hello, {name}!"))
    });

    let app = App::new(RuntimeConfig::new(), caches, move |ctx| {
        ctx.title("Counter");
        ctx.state_mut().init("counter", 0)?;

        let step = ctx.slider("Step", 1, 10, 1, WidgetOptions::new().key("step"))?;
        let increment = Callback::new(|state, _| {
            let step: i64 = state.get_as("step")?;
            state.update::<i64, _>("counter", |c| c + step)
        });
        ctx.button("Increment", WidgetOptions::new().key("increment").on_click(increment))?;
        if ctx.button("Reset", WidgetOptions::new().key("reset"))? {
            ctx.state_mut().set("counter", 0)?;
        }

        let counter: i64 = ctx.state().get_as("counter")?;
        ctx.write(&format!("Counter = {counter} (step {step})"))?;
        if counter >= 10 {
            ctx.write(&greeting.call(&"high scorer".to_string())?)?;
            ctx.stop()?;
        }
        ctx.caption("Keep clicking");
        Ok(())
    });

    let session = app.open_session();
    print_tree(&app.handle(session, None)?.tree);

    let events = [
        Event::click(WidgetId::explicit("increment")),
        Event::widget_changed(WidgetId::explicit("step"), 5)?,
        Event::click(WidgetId::explicit("increment")),
        Event::click(WidgetId::explicit("increment")),
        Event::click(WidgetId::explicit("reset")),
    ];
    for event in events {
        let outcome = app.handle(session, Some(event))?;
        print_tree(&outcome.tree);
    }

    for (function, policy, stats) in app.caches().stats() {
        println!("{function} ({policy:?}): {stats:?}");
    }
    Ok(())
}
