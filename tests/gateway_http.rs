use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use agenda_share::gateway::{CalendarBackend, GatewayConfig, GatewayError, RestGateway};
use agenda_share::model::{Client, ScheduledPost};
use tiny_http::{Header, Response, Server};

#[derive(Debug)]
struct Recorded {
    method: String,
    url: String,
    body: String,
    apikey: Option<String>,
    authorization: Option<String>,
    client_info: Option<String>,
}

/// Serves the canned `(status, body)` replies in order, then returns what
/// it received.
fn serve(replies: Vec<(u16, &'static str)>) -> (RestGateway, JoinHandle<Vec<Recorded>>) {
    let server = Server::http("127.0.0.1:0").expect("bind loopback");
    let port = server
        .server_addr()
        .to_ip()
        .expect("ip listener")
        .port();

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in replies {
            let mut request = server.recv().expect("request");
            let mut received = String::new();
            request
                .as_reader()
                .read_to_string(&mut received)
                .expect("read body");
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_string())
            };
            seen.push(Recorded {
                method: request.method().to_string(),
                url: request.url().to_string(),
                body: received,
                apikey: header("apikey"),
                authorization: header("Authorization"),
                client_info: header("x-client-info"),
            });
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(content_type);
            request.respond(response).expect("respond");
        }
        seen
    });

    let gateway = RestGateway::new(GatewayConfig {
        url: format!("http://127.0.0.1:{port}/"),
        api_key: "anon-key".into(),
        client_info: "agenda-test".into(),
        timeout: Duration::from_secs(5),
        http_client: None,
    })
    .expect("gateway");
    (gateway, handle)
}

#[test]
fn fetch_posts_filters_by_client_and_orders_by_date() {
    let (gateway, server) = serve(vec![(
        200,
        r#"[{"id":1,"date":"2024-06-01","dayofweek":"Saturday","title":"Launch","posttype":"Feed","text":"Hi","clientid":"acme","socialnetworks":["instagram"],"completed":true}]"#,
    )]);
    let posts = gateway.fetch_client_posts("acme").unwrap();
    let seen = server.join().unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post_type, "Feed");
    assert_eq!(posts[0].day_of_week, "Saturday");
    assert_eq!(posts[0].social_networks, vec!["instagram".to_string()]);
    assert!(posts[0].completed);

    let request = &seen[0];
    assert_eq!(request.method, "GET");
    assert!(request.url.starts_with("/rest/v1/posts?"));
    assert!(request.url.contains("clientid=eq.acme"));
    assert!(request.url.contains("order=date.asc"));
    assert_eq!(request.apikey.as_deref(), Some("anon-key"));
    assert_eq!(request.authorization.as_deref(), Some("Bearer anon-key"));
    assert_eq!(request.client_info.as_deref(), Some("agenda-test"));
}

#[test]
fn save_without_id_inserts_and_with_id_updates() {
    let (gateway, server) = serve(vec![
        (201, r#"[{"id":10,"date":"d","title":"New","clientid":"acme"}]"#),
        (200, r#"[{"id":5,"date":"d","title":"Edited","clientid":"acme"}]"#),
    ]);
    let fresh = ScheduledPost {
        title: "New".into(),
        client_id: Some("acme".into()),
        ..Default::default()
    };
    let inserted = gateway.save_post(&fresh).unwrap();
    let edited = ScheduledPost {
        id: Some(5),
        title: "Edited".into(),
        ..fresh.clone()
    };
    let updated = gateway.save_post(&edited).unwrap();
    let seen = server.join().unwrap();

    assert_eq!(inserted.id, Some(10));
    assert_eq!(updated.title, "Edited");

    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].url, "/rest/v1/posts");
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert!(body.get("id").is_none());
    assert_eq!(body["clientid"], "acme");

    assert_eq!(seen[1].method, "PATCH");
    assert_eq!(seen[1].url, "/rest/v1/posts?id=eq.5");
}

#[test]
fn update_matching_nothing_is_not_found() {
    let (gateway, server) = serve(vec![(200, "[]")]);
    let post = ScheduledPost {
        id: Some(42),
        client_id: Some("acme".into()),
        ..Default::default()
    };
    let err = gateway.save_post(&post).unwrap_err();
    server.join().unwrap();
    assert_eq!(
        err,
        GatewayError::NotFound {
            table: "posts",
            id: "42".into()
        }
    );
}

#[test]
fn client_password_is_checked() {
    let row = r##"[{"id":"acme","name":"Acme","themecolor":"#112233","password":"abc"}]"##;
    let (gateway, server) = serve(vec![(200, row), (200, row), (200, row), (200, "[]")]);

    let client = gateway.fetch_client_by_id("acme", Some("abc")).unwrap();
    assert_eq!(client.theme_color, "#112233");
    assert_eq!(
        gateway.fetch_client_by_id("acme", Some("xyz")),
        Err(GatewayError::PasswordMismatch("acme".into()))
    );
    assert!(gateway.fetch_client_by_id("acme", None).is_ok());
    assert!(matches!(
        gateway.fetch_client_by_id("ghost", None),
        Err(GatewayError::NotFound { table: "clients", .. })
    ));

    let seen = server.join().unwrap();
    assert!(seen[0].url.contains("id=eq.acme"));
}

#[test]
fn failures_are_classified() {
    let (gateway, server) = serve(vec![
        (503, r#"{"message":"down"}"#),
        (400, r#"{"message":"bad column"}"#),
        (200, "not json"),
    ]);
    assert!(matches!(
        gateway.fetch_clients(),
        Err(GatewayError::Transient(_))
    ));
    assert!(matches!(
        gateway.fetch_clients(),
        Err(GatewayError::Validation(_))
    ));
    assert!(matches!(
        gateway.fetch_clients(),
        Err(GatewayError::Decode(_))
    ));
    server.join().unwrap();
}

#[test]
fn delete_and_save_client() {
    let (gateway, server) = serve(vec![
        (204, ""),
        (201, r#"[{"id":"c-1","name":"Globex","themecolor":null}]"#),
    ]);
    gateway.delete_post(3).unwrap();
    let saved = gateway.save_client(&Client::new("Globex")).unwrap();
    let seen = server.join().unwrap();

    assert_eq!(seen[0].method, "DELETE");
    assert_eq!(seen[0].url, "/rest/v1/posts?id=eq.3");
    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].url, "/rest/v1/clients");
    assert_eq!(saved.id.as_deref(), Some("c-1"));
    assert_eq!(saved.theme_color, agenda_share::model::DEFAULT_THEME_COLOR);
}
