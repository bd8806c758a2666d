use bytes::Bytes;
use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite};
use http::header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, SET_COOKIE, VARY};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use jot_session::{
    Error, MemoryStore, RequestSessionExt, ResponseGuard, SequentialTokenGenerator,
    SessionConfig, SessionCookieIssued, SessionId, SessionManager, SessionRecord, SessionStore,
    CSRF_TOKEN_KEY,
};
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{service_fn, BoxError, ServiceExt};

type Body = Full<Bytes>;

fn manager() -> SessionManager<MemoryStore> {
    manager_with_config(SessionConfig::default())
}

fn manager_with_config(config: SessionConfig) -> SessionManager<MemoryStore> {
    SessionManager::new_with_generator(
        MemoryStore::new(),
        config,
        SequentialTokenGenerator::<32>::default(),
    )
}

fn request(method: Method, session_id: Option<&str>) -> http::request::Builder {
    let builder = Request::builder().method(method).uri("/empire");
    match session_id {
        Some(session_id) => builder.header(COOKIE, format!("theme=dark; session={session_id}")),
        None => builder,
    }
}

fn get(session_id: Option<&str>) -> Request<Body> {
    request(Method::GET, session_id)
        .body(Body::default())
        .unwrap()
}

/// All `Set-Cookie` values of the response that concern the session cookie.
fn session_cookies<ResBody>(response: &Response<ResBody>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_owned())
        .filter(|value| value.starts_with("session="))
        .collect()
}

/// The session id set by the single session cookie of the response.
fn session_cookie_value<ResBody>(response: &Response<ResBody>) -> String {
    let cookies = session_cookies(response);
    assert_eq!(cookies.len(), 1, "expected one session cookie: {cookies:?}");
    let (pair, _) = cookies[0].split_once(';').unwrap();
    pair.trim_start_matches("session=").to_owned()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn visits(request: Request<Body>) -> Result<Response<Body>, Infallible> {
    let session = request.session().unwrap();
    let visits = session.get::<u32>("visits").unwrap_or(0) + 1;
    session.put("visits", visits).unwrap();
    Ok(Response::new(Body::from(visits.to_string())))
}

async fn echo(request: Request<Body>) -> Result<Response<Body>, Infallible> {
    let body = request.into_body().collect().await?.to_bytes();
    Ok(Response::new(Body::new(body)))
}

/// Run one request through `visits` to obtain a stored session. Returns its id and CSRF token.
async fn establish(manager: &SessionManager<MemoryStore>) -> (String, String) {
    let response = manager
        .handle(service_fn(visits))
        .oneshot(get(None))
        .await
        .unwrap();
    let id = session_cookie_value(&response);
    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    let csrf_token = record.csrf_token().unwrap().to_owned();
    (id, csrf_token)
}

/// A request without a cookie gets a fresh session, which is stored and sent as cookie.
#[tokio::test]
async fn test_fresh_session() {
    let manager = manager();
    let response = manager
        .handle(service_fn(visits))
        .oneshot(get(None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = session_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let cookie = Cookie::parse(cookies[0].as_str()).unwrap();
    assert_eq!(cookie.value(), format!("{:032}", 0));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(7200)));
    let expires = cookie.expires_datetime().unwrap().unix_timestamp();
    assert!((expires - (Utc::now().timestamp() + 7200)).abs() <= 5);
    assert_eq!(response.headers().get(VARY).unwrap(), "Cookie");
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        r#"no-cache="Set-Cookie""#
    );

    assert_eq!(manager.store().len(), 1);
    manager.store().for_each(|record| {
        assert_eq!(record.data["visits"], 1);
        assert_eq!(record.csrf_token(), Some(format!("{:032}", 1).as_str()));
    });
    assert_eq!(body_string(response).await, "1");
}

/// Cookie attributes loaded from a serialised configuration end up on the session cookie.
#[tokio::test]
async fn test_configured_cookie_attributes() {
    let config: SessionConfig = serde_json::from_str(
        r#"{"cookie_same_site": "strict", "cookie_domain": "example.com", "cookie_secure": false}"#,
    )
    .unwrap();
    assert_eq!(config.cookie_same_site, SameSite::Strict);
    assert!(serde_json::to_string(&config)
        .unwrap()
        .contains(r#""cookie_same_site":"Strict""#));
    assert!(serde_json::from_str::<SessionConfig>(r#"{"cookie_same_site": "sometimes"}"#).is_err());

    let manager = manager_with_config(config);
    let response = manager
        .handle(service_fn(visits))
        .oneshot(get(None))
        .await
        .unwrap();
    let cookies = session_cookies(&response);
    let cookie = Cookie::parse(cookies[0].as_str()).unwrap();
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.domain(), Some("example.com"));
    assert_eq!(cookie.secure(), None);
}

/// Data put into the session is visible to the next request with the same cookie.
#[tokio::test]
async fn test_session_persists_across_requests() {
    let manager = manager();
    let service = manager.handle(service_fn(visits));
    let (id, _) = establish(&manager).await;

    let response = service.clone().oneshot(get(Some(id.as_str()))).await.unwrap();
    assert_eq!(session_cookie_value(&response), id);
    assert_eq!(body_string(response).await, "2");

    let response = service.oneshot(get(Some(id.as_str()))).await.unwrap();
    assert_eq!(body_string(response).await, "3");
    assert_eq!(manager.store().len(), 1);
}

/// Unknown session ids are replaced with a fresh session.
#[tokio::test]
async fn test_unknown_session() {
    let manager = manager();
    let response = manager
        .handle(service_fn(|request: Request<Body>| async move {
            assert!(request.session().unwrap().is_fresh());
            Ok::<_, Infallible>(Response::new(Body::default()))
        }))
        .oneshot(get(Some("forged")))
        .await
        .unwrap();
    assert_ne!(session_cookie_value(&response), "forged");
    assert!(manager
        .store()
        .read(&SessionId::from_cookie_value("forged"))
        .await
        .unwrap()
        .is_none());
}

/// Expired sessions are destroyed and replaced with a fresh session.
#[tokio::test]
async fn test_expired_session() {
    let manager = manager();
    for (id, created_ago, idle_for) in [
        ("idle", Duration::hours(3), Duration::hours(3)),
        ("old", Duration::days(2), Duration::minutes(1)),
    ] {
        let mut record = SessionRecord::new(
            SessionId::from_cookie_value(id),
            "csrf".to_owned(),
            Utc::now() - created_ago,
        );
        record.last_activity_at = Utc::now() - idle_for;
        record.data.insert("visits".to_owned(), 41.into());
        manager.store().write(&record).await.unwrap();

        let response = manager
            .handle(service_fn(visits))
            .oneshot(get(Some(id)))
            .await
            .unwrap();
        assert_ne!(session_cookie_value(&response), id);
        assert_eq!(body_string(response).await, "1");
        assert!(manager.store().read(&record.id).await.unwrap().is_none());
    }
}

/// A stored session without a CSRF token is destroyed and replaced with a usable fresh session.
#[tokio::test]
async fn test_session_without_csrf_token() {
    let manager = manager();
    for (id, csrf_token) in [("tokenless", None), ("blank", Some(""))] {
        let mut record = SessionRecord::new(
            SessionId::from_cookie_value(id),
            "csrf".to_owned(),
            Utc::now(),
        );
        match csrf_token {
            Some(csrf_token) => {
                record
                    .data
                    .insert(CSRF_TOKEN_KEY.to_owned(), csrf_token.into());
            }
            None => {
                record.data.remove(CSRF_TOKEN_KEY);
            }
        }
        record.data.insert("visits".to_owned(), 41.into());
        manager.store().write(&record).await.unwrap();

        let response = manager
            .handle(service_fn(visits))
            .oneshot(get(Some(id)))
            .await
            .unwrap();
        let new_id = session_cookie_value(&response);
        assert_ne!(new_id, id);
        assert_eq!(body_string(response).await, "1");
        assert!(manager.store().read(&record.id).await.unwrap().is_none());

        let fresh = manager
            .store()
            .read(&SessionId::from_cookie_value(new_id.as_str()))
            .await
            .unwrap()
            .unwrap();
        let csrf_token = fresh.csrf_token().unwrap().to_owned();
        assert!(!csrf_token.is_empty());
        let response = manager
            .handle(service_fn(visits))
            .oneshot(
                request(Method::POST, Some(new_id.as_str()))
                    .header("X-XSRF-Token", csrf_token)
                    .body(Body::default())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "2");
    }
}

/// Lifetimes too large to represent are refused by validation, and never break a request.
#[tokio::test]
async fn test_unbounded_expiration() {
    let config = SessionConfig {
        idle_expiration_secs: u64::MAX,
        absolute_expiration_secs: u64::MAX,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

    let manager = manager_with_config(config);
    let (id, _) = establish(&manager).await;
    let response = manager
        .handle(service_fn(visits))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session_cookie_value(&response), id);
    assert_eq!(body_string(response).await, "2");
    assert!(matches!(manager.spawn_reaper(), Err(Error::InvalidConfig(_))));
}

/// A zero sweep interval is refused instead of starting a reaper.
#[tokio::test]
async fn test_spawn_reaper_zero_interval() {
    let manager = manager_with_config(SessionConfig {
        cleanup_interval_secs: 0,
        ..Default::default()
    });
    assert!(matches!(manager.spawn_reaper(), Err(Error::InvalidConfig(_))));
}

/// A POST without CSRF token is rejected before it reaches the handler.
#[tokio::test]
async fn test_post_without_csrf_token() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let service = manager.handle(service_fn({
        let calls = Arc::clone(&calls);
        move |_: Request<Body>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(Response::new(Body::default())) }
        }
    }));

    for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
        let response = service
            .clone()
            .oneshot(request(method, Some(id.as_str())).body(Body::default()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(session_cookie_value(&response), id);
        assert_eq!(response.headers().get(VARY).unwrap(), "Cookie");
    }

    let response = service
        .oneshot(
            request(Method::POST, Some(id.as_str()))
                .header("X-XSRF-Token", "wrong")
                .body(Body::default())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// A POST without any session is rejected as well.
#[tokio::test]
async fn test_post_without_session() {
    let manager = manager();
    let response = manager
        .handle(service_fn(visits))
        .oneshot(
            request(Method::POST, None)
                .header("X-XSRF-Token", "")
                .body(Body::default())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(session_cookies(&response).len(), 1);
}

/// A POST with the session's CSRF token in the header reaches the handler.
#[tokio::test]
async fn test_post_with_csrf_header() {
    let manager = manager();
    let (id, csrf_token) = establish(&manager).await;
    let response = manager
        .handle(service_fn(visits))
        .oneshot(
            request(Method::POST, Some(id.as_str()))
                .header("X-XSRF-Token", csrf_token)
                .body(Body::default())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "2");
}

/// A form submission carrying the CSRF token reaches the handler with its body intact.
#[tokio::test]
async fn test_post_with_csrf_form_field() {
    let manager = manager();
    let (id, csrf_token) = establish(&manager).await;
    let form = format!("planet=Mars&{CSRF_TOKEN_KEY}={csrf_token}&fleet=7");
    let response = manager
        .handle(service_fn(echo))
        .oneshot(
            request(Method::POST, Some(id.as_str()))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                .body(Body::from(form.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, form);
}

/// The CSRF form field is only honoured for url-encoded forms within the size limit.
#[tokio::test]
async fn test_post_with_unusable_form() {
    let manager = manager_with_config(SessionConfig {
        max_form_bytes: 64,
        ..Default::default()
    });
    let (id, csrf_token) = establish(&manager).await;
    let service = manager.handle(service_fn(echo));

    let json = service
        .clone()
        .oneshot(
            request(Method::POST, Some(id.as_str()))
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(format!("csrf_token={csrf_token}")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json.status(), StatusCode::FORBIDDEN);

    let oversized = service
        .oneshot(
            request(Method::POST, Some(id.as_str()))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!(
                    "csrf_token={csrf_token}&padding={}",
                    "x".repeat(100)
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::FORBIDDEN);
}

/// Safe methods are never checked for a CSRF token, not even a wrong one.
#[tokio::test]
async fn test_get_ignores_csrf() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
        let response = manager
            .handle(service_fn(visits))
            .oneshot(
                request(method, Some(id.as_str()))
                    .header("X-XSRF-Token", "wrong")
                    .body(Body::default())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

/// CSRF tokens of fresh sessions are non-empty and unique.
#[test]
fn test_csrf_tokens_unique() {
    let manager = SessionManager::new(MemoryStore::new(), SessionConfig::default());
    let mut tokens = HashSet::new();
    for _ in 0..10_000 {
        let token = manager.new_session().csrf_token().unwrap();
        assert_eq!(token.len(), 32);
        assert!(tokens.insert(token));
    }
}

/// The CSRF token cannot be overwritten or deleted through the session accessors.
#[test]
fn test_csrf_token_reserved() {
    let session = manager().new_session();
    let csrf_token = session.csrf_token();
    assert!(matches!(
        session.put(CSRF_TOKEN_KEY, "forged"),
        Err(Error::ReservedKey(_))
    ));
    assert_eq!(session.delete(CSRF_TOKEN_KEY), None);
    assert_eq!(session.csrf_token(), csrf_token);
}

/// Handlers that set the session cookie themselves do not produce a second one.
#[tokio::test]
async fn test_single_session_cookie() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let response = manager
        .handle(service_fn(|_: Request<Body>| async {
            let mut response = Response::new(Body::from("written twice"));
            let headers = response.headers_mut();
            headers.append(SET_COOKIE, HeaderValue::from_static("session=evil; Path=/"));
            headers.append(SET_COOKIE, HeaderValue::from_static("theme=light; Path=/"));
            headers.append(SET_COOKIE, HeaderValue::from_static("session=worse"));
            Ok::<_, Infallible>(response)
        }))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();

    assert_eq!(session_cookie_value(&response), id);
    assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    assert!(response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|value| value == "theme=light; Path=/"));
}

/// The guard keeps a cookie that the handler explicitly issued.
#[test]
fn test_guard_keeps_issued_cookie() {
    let mut response = Response::new(());
    response
        .headers_mut()
        .append(SET_COOKIE, HeaderValue::from_static("session=issued"));
    response
        .extensions_mut()
        .insert(SessionCookieIssued::Created(SessionId::from_cookie_value(
            "issued",
        )));
    ResponseGuard::new("session", Some(HeaderValue::from_static("session=current")))
        .apply(&mut response);
    assert_eq!(session_cookies(&response), vec!["session=issued".to_owned()]);
}

/// Changes are persisted even if the handler fails.
#[tokio::test]
async fn test_handler_error_persists() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let result = manager
        .handle(service_fn(|request: Request<Body>| async move {
            request.session()?.put("last_error", "boom")?;
            Err::<Response<Body>, BoxError>("boom".into())
        }))
        .oneshot(get(Some(id.as_str())))
        .await;
    assert!(result.is_err());

    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.data["last_error"], "boom");
}

/// Renewing the id moves the session to a new id and a new CSRF token.
#[tokio::test]
async fn test_renew_id() {
    let manager = manager();
    let (id, csrf_token) = establish(&manager).await;
    let response = manager
        .handle(service_fn(|request: Request<Body>| async move {
            let session = request.session()?;
            session.put("user_id", "42")?;
            session.renew_id();
            Ok::<_, BoxError>(Response::new(Body::default()))
        }))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();

    let new_id = session_cookie_value(&response);
    assert_ne!(new_id, id);
    assert!(manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .is_none());
    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(new_id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.data["visits"], 1);
    assert_eq!(record.data["user_id"], "42");
    assert_ne!(record.csrf_token(), Some(csrf_token.as_str()));
}

/// Destroying a session removes it from the store and deletes the cookie.
#[tokio::test]
async fn test_destroy() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let response = manager
        .handle(service_fn(|request: Request<Body>| async move {
            let session = request.session()?;
            session.destroy();
            assert!(session.is_destroyed());
            assert_eq!(session.get::<u32>("visits"), None);
            Ok::<_, BoxError>(Response::new(Body::default()))
        }))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();

    assert_eq!(session_cookie_value(&response), "");
    assert!(session_cookies(&response)[0].contains("; Max-Age=0"));
    assert!(manager.store().is_empty());
}

/// `create_session` logs a user in with a new session whose cookie replaces the current one.
#[tokio::test]
async fn test_create_session() {
    let manager = manager();
    let response = manager
        .handle(service_fn({
            let manager = manager.clone();
            move |_: Request<Body>| {
                let manager = manager.clone();
                async move {
                    let mut response = Response::new(Body::default());
                    manager.create_session(&mut response, "42").await?;
                    Ok::<_, BoxError>(response)
                }
            }
        }))
        .oneshot(get(None))
        .await
        .unwrap();

    let id = session_cookie_value(&response);
    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.data["user_id"], "42");
    // The request's own fresh session is not written next to the created one.
    assert_eq!(manager.store().len(), 1);
}

/// A session created for a login replaces the request's stored session instead of orphaning it.
#[tokio::test]
async fn test_create_session_replaces_stored() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let response = manager
        .handle(service_fn({
            let manager = manager.clone();
            move |request: Request<Body>| {
                let manager = manager.clone();
                async move {
                    request.session()?.put("visits", 99)?;
                    let mut response = Response::new(Body::default());
                    manager.create_session(&mut response, "42").await?;
                    Ok::<_, BoxError>(response)
                }
            }
        }))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();

    let new_id = session_cookie_value(&response);
    assert_ne!(new_id, id);
    assert!(manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .is_none());
    assert_eq!(manager.store().len(), 1);
    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(new_id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.data["user_id"], "42");
    assert!(!record.data.contains_key("visits"));
}

/// `delete_session` on the request's own session leaves nothing behind.
#[tokio::test]
async fn test_delete_session() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let response = manager
        .handle(service_fn({
            let manager = manager.clone();
            move |request: Request<Body>| {
                let manager = manager.clone();
                async move {
                    let session = request.session()?;
                    let mut response = Response::new(Body::default());
                    manager.delete_session(&mut response, &session.id()).await?;
                    Ok::<_, BoxError>(response)
                }
            }
        }))
        .oneshot(get(Some(id.as_str())))
        .await
        .unwrap();

    assert_eq!(session_cookie_value(&response), "");
    assert!(manager.store().is_empty());
}

/// Concurrent requests of the same session all succeed, the last write wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let manager = manager();
    let (id, _) = establish(&manager).await;
    let service = manager.handle(service_fn(visits));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = service.clone();
        let request = get(Some(id.as_str()));
        handles.push(tokio::spawn(async move {
            service.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(manager.store().len(), 1);
    let record = manager
        .store()
        .read(&SessionId::from_cookie_value(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    let visits = record.data["visits"].as_u64().unwrap();
    assert!((2..=33).contains(&visits));
}

/// Handlers outside of a session manager get an error instead of a session.
#[test]
fn test_session_missing() {
    let request = Request::new(());
    assert!(matches!(request.session(), Err(Error::SessionMissing)));
    let (parts, ()) = request.into_parts();
    assert!(matches!(parts.session(), Err(Error::SessionMissing)));
}

/// The manager also works as a tower layer.
#[tokio::test]
async fn test_layer() {
    let manager = manager();
    let service = tower::ServiceBuilder::new()
        .layer(manager.clone())
        .service(service_fn(visits));
    let response = service.oneshot(get(None)).await.unwrap();
    assert_eq!(session_cookies(&response).len(), 1);
    assert_eq!(manager.store().len(), 1);
}
