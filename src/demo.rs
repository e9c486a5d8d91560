//! Sample dashboard served by the binary.

use std::sync::Arc;

use dashhub_compiler::{Component, Dashboard, ELEMENT_KIND, Navigation, Page};
use dashhub_core::{ComponentId, Endpoint, EndpointError, EndpointHandler, ExecutionContext, Target, handler_fn};
use serde_json::{Value, json};

/// Memory cache key holding the shared click count.
pub const CLICKS_KEY: &str = "demo.clicks";

/// Two pages, a live counter shared by every client, a name echo, and a
/// button that reads the name field back from the caller's page.
pub fn dashboard() -> Dashboard {
    let home = Page::new("Home")
        .url("/")
        .component(
            Component::with_id("row", "controls")
                .child(
                    Component::with_id("button", "increment")
                        .property("label", json!("+1"))
                        .on_event(increment()),
                )
                .child(
                    Component::with_id("button", "reset")
                        .property("label", json!("Reset"))
                        .on_event(reset()),
                ),
        )
        .component(Component::with_id("counter", "clicks").property("value", json!(0)))
        .component(
            Component::with_id("column", "greeter")
                .child(Component::with_id("input", "name").on("onChange", greet()))
                .child(Component::with_id("button", "peek").on_event(peek())),
        )
        .component(Component::with_id(ELEMENT_KIND, "banner").script("document.title = 'dashhub demo';"));

    let about = Page::new("About").url("/about").on_load(about_text());

    Dashboard::new("dashhub demo")
        .page(home)
        .page(about)
        .navigation(Navigation {
            callback: Some(Arc::new(Endpoint::new("nav", navigate()))),
            child_endpoints: Vec::new(),
        })
}

fn clicks_state(count: &Value) -> Value {
    json!({ "value": count })
}

/// Bump the shared count and push it to every client.
fn increment() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let count = ctx
            .memory_cache
            .update(CLICKS_KEY, |current| json!(current.and_then(Value::as_u64).unwrap_or(0) + 1));
        let _ = ctx
            .commands
            .set_state(&Target::All, &ComponentId::from("clicks"), clicks_state(&count));
        async { Ok(()) }
    })
}

fn reset() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let _ = ctx.memory_cache.set(CLICKS_KEY, json!(0));
        let _ = ctx
            .commands
            .set_state(&Target::All, &ComponentId::from("clicks"), clicks_state(&json!(0)));
        async { Ok(()) }
    })
}

fn greet() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let name = match ctx.event_data() {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_owned(),
            _ => ctx.user.clone().unwrap_or_else(|| "stranger".to_owned()),
        };
        let _ = ctx.set_state(
            &ComponentId::from("greeting"),
            json!({ "text": format!("Hello, {name}!") }),
        );
        async { Ok(()) }
    })
}

/// Ask the caller's page for the name field and toast it back.
fn peek() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let bus = Arc::clone(&ctx.state_requests);
        let commands = ctx.commands.clone();
        let connection_id = ctx.connection_id.clone();
        let timeout = ctx.state_request_timeout;
        async move {
            let connection_id = connection_id.ok_or_else(|| EndpointError::failed("no calling connection"))?;
            let state = bus
                .request_state(&connection_id, &ComponentId::from("name"))
                .wait(timeout)
                .await?;
            let _ = commands.show_toast(&connection_id, json!({ "message": format!("name field holds {state}") }));
            Ok::<(), EndpointError>(())
        }
    })
}

fn about_text() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let _ = ctx.set_state(
            &ComponentId::from("about"),
            json!({ "text": "Served by dashhub." }),
        );
        async { Ok(()) }
    })
}

fn navigate() -> Arc<dyn EndpointHandler> {
    handler_fn(|ctx: &ExecutionContext| {
        let target = match ctx.event_data() {
            Some(Value::String(path)) if path.starts_with('/') => path.clone(),
            _ => "/".to_owned(),
        };
        let delivered = ctx
            .connection_id
            .as_ref()
            .is_some_and(|c| ctx.commands.redirect(c, target, false));
        async move {
            if delivered {
                Ok(())
            } else {
                Err(EndpointError::failed("redirect not delivered"))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashhub_core::{CallerContext, ClientEvent, CommandSink, DashboardHub, EndpointRegistry};
    use dashhub_server::ConnectionManager;
    use std::time::Duration;

    fn serve() -> (DashboardHub, Arc<ConnectionManager>) {
        let registry = Arc::new(EndpointRegistry::new());
        let _ = dashhub_compiler::compile(&dashboard()).register(&registry);
        let manager = Arc::new(ConnectionManager::new(16));
        let hub = DashboardHub::new(Arc::clone(&manager) as Arc<dyn CommandSink>, registry);
        (hub, manager)
    }

    fn frame(rx: &mut tokio::sync::mpsc::Receiver<Arc<String>>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn compiles_every_callback() {
        let app = dashhub_compiler::compile(&dashboard());
        let ids = app.endpoint_ids();
        for expected in ["increment", "reset", "nameonChange", "peek", "nav"] {
            assert!(ids.contains(&expected), "{expected} missing from {ids:?}");
        }
        assert_eq!(app.endpoints.len(), 6);
        assert!(app.element_scripts.contains_key("banner"));
    }

    #[tokio::test]
    async fn increment_broadcasts_shared_count() {
        let (hub, manager) = serve();
        let (a, mut rx_a) = manager.register();
        let (_b, mut rx_b) = manager.register();
        let caller = CallerContext::new(a.id.clone());

        for _ in 0..2 {
            hub.client_event(&caller, ClientEvent::new("increment", "onClick"))
                .unwrap()
                .await
                .unwrap()
                .unwrap();
        }

        assert_eq!(frame(&mut rx_a)["state"]["value"], 1);
        assert_eq!(frame(&mut rx_a)["state"]["value"], 2);
        assert_eq!(frame(&mut rx_b)["state"]["value"], 1);
        assert_eq!(hub.memory_cache().get(CLICKS_KEY), Some(json!(2)));
    }

    #[tokio::test]
    async fn greet_falls_back_to_user() {
        let (hub, manager) = serve();
        let (conn, mut rx) = manager.register();
        let caller = CallerContext::new(conn.id.clone()).with_user("alice");

        hub.client_event(&caller, ClientEvent::new("nameonChange", "onChange"))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame(&mut rx)["state"]["text"], "Hello, alice!");

        hub.client_event(&caller, ClientEvent::new("nameonChange", "onChange").with_data(" Bob "))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame(&mut rx)["state"]["text"], "Hello, Bob!");
    }

    #[tokio::test]
    async fn peek_round_trips_through_client() {
        let (hub, manager) = serve();
        let (conn, mut rx) = manager.register();
        let caller = CallerContext::new(conn.id.clone());

        let handle = hub
            .client_event(&caller, ClientEvent::new("peek", "onClick"))
            .unwrap();

        let request = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let request: Value = serde_json::from_str(&request).unwrap();
        assert_eq!(request["type"], "requestState");
        let request_id = request["requestId"].as_str().unwrap();

        assert!(hub.request_state_response(&conn.id, &request_id.into(), json!("Carol")));
        handle.await.unwrap().unwrap();
        let toast = frame(&mut rx);
        assert_eq!(toast["type"], "showToast");
        assert_eq!(toast["toast"]["message"], "name field holds \"Carol\"");
    }

    #[tokio::test]
    async fn nav_redirects_caller() {
        let (hub, manager) = serve();
        let (conn, mut rx) = manager.register();
        let caller = CallerContext::new(conn.id.clone());

        hub.client_event(&caller, ClientEvent::new("nav", "onClick").with_data("/about"))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        let redirect = frame(&mut rx);
        assert_eq!(redirect["type"], "redirect");
        assert_eq!(redirect["url"], "/about");
    }
}
