//! REST-Pfad fuer den alten Polling-Client
//!
//! Der Client legt sich per `POST /api/users` an, setzt seine Flags per
//! PUT und sucht selbst einen zufaelligen verfuegbaren Partner. Die Routen
//! arbeiten nur auf dem Benutzerspeicher, nie auf der Warteschlange.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{post, put},
    Router,
};
use randchat_core::types::UserId;
use randchat_db::{AvailabilityUpdate, DbError, UserStatus, UserStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

type StoreState = Arc<dyn UserStore>;

pub fn legacy_router(store: StoreState) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/new-user-update/:id", put(new_user_update))
        .route("/leaving-user-update/:id", put(leaving_user_update))
        .route(
            "/update-on-other-user-closing/:id",
            put(update_on_other_user_closing),
        )
        .route("/update-on-engagement/:id", put(update_on_engagement))
        .route("/update-on-next/:id", put(update_on_next))
        .route("/api/remote-user-find", post(remote_user_find))
        .route("/api/get-next-user", post(get_next_user))
        .with_state(store)
}

#[derive(Debug, Deserialize)]
pub struct SucheBody {
    #[serde(rename = "omeID")]
    pub ome_id: UserId,
    /// Vorheriger Partner; darf wieder gezogen werden
    #[serde(rename = "remoteUser", default)]
    pub remote_user: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct Treffer {
    #[serde(rename = "_id")]
    id: UserId,
}

/// `POST /api/users` – Antwort ist die neue Kennung als Text
pub async fn create_user(State(store): State<StoreState>) -> Response {
    match store.create_user().await {
        Ok(id) => {
            tracing::info!(user_id = %id, "Benutzer angelegt");
            (StatusCode::OK, id.to_string()).into_response()
        }
        Err(e) => fehler_antwort(e, "Error while creating user"),
    }
}

pub async fn new_user_update(State(store): State<StoreState>, Path(id): Path<String>) -> Response {
    aktualisieren(store, id, AvailabilityUpdate::nur_active(true), "1 document updated").await
}

pub async fn leaving_user_update(
    State(store): State<StoreState>,
    Path(id): Path<String>,
) -> Response {
    aktualisieren(
        store,
        id,
        AvailabilityUpdate::beide(false, UserStatus::Available),
        "1 document updated",
    )
    .await
}

pub async fn update_on_other_user_closing(
    State(store): State<StoreState>,
    Path(id): Path<String>,
) -> Response {
    aktualisieren(
        store,
        id,
        AvailabilityUpdate::beide(true, UserStatus::Available),
        "1 document updated",
    )
    .await
}

pub async fn update_on_engagement(
    State(store): State<StoreState>,
    Path(id): Path<String>,
) -> Response {
    aktualisieren(
        store,
        id,
        AvailabilityUpdate::nur_status(UserStatus::Engaged),
        "1 document updated",
    )
    .await
}

pub async fn update_on_next(State(store): State<StoreState>, Path(id): Path<String>) -> Response {
    aktualisieren(
        store,
        id,
        AvailabilityUpdate::beide(true, UserStatus::Available),
        "User status updated to available",
    )
    .await
}

/// `POST /api/remote-user-find` – `[{"_id": ...}]` oder `[]`
pub async fn remote_user_find(
    State(store): State<StoreState>,
    Json(body): Json<SucheBody>,
) -> Response {
    suchen(store, body).await
}

/// `POST /api/get-next-user` – wie oben, der vorige Partner ist erlaubt
pub async fn get_next_user(State(store): State<StoreState>, Json(body): Json<SucheBody>) -> Response {
    suchen(store, body).await
}

async fn aktualisieren(
    store: StoreState,
    id: String,
    update: AvailabilityUpdate,
    meldung: &'static str,
) -> Response {
    let id = UserId::new(id);
    match store.aktualisieren(&id, update).await {
        Ok(()) => {
            tracing::debug!(user_id = %id, "Verfuegbarkeit aktualisiert");
            (StatusCode::OK, meldung).into_response()
        }
        Err(e) if e.ist_nicht_gefunden() => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "message": format!("Cannot update user with {id} Maybe user not found!")
            })),
        )
            .into_response(),
        Err(e) => fehler_antwort(e, "Error update user information"),
    }
}

async fn suchen(store: StoreState, body: SucheBody) -> Response {
    tracing::debug!(
        user_id = %body.ome_id,
        vorher = ?body.remote_user,
        "Suche zufaelligen Partner"
    );
    match store.find_random_available_peer(&body.ome_id).await {
        Ok(Some(id)) => (StatusCode::OK, Json(vec![Treffer { id }])).into_response(),
        Ok(None) => (StatusCode::OK, Json(Vec::<Treffer>::new())).into_response(),
        Err(e) => fehler_antwort(e, "Error occured while retrieving user information."),
    }
}

fn fehler_antwort(fehler: DbError, meldung: &str) -> Response {
    tracing::warn!(fehler = %fehler, "Benutzerspeicher-Fehler");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": meldung })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use randchat_db::MemoryStore;
    use tower::ServiceExt;

    async fn anfrage(
        router: Router,
        methode: &str,
        pfad: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(methode).uri(pfad);
        let body = match body {
            Some(b) => {
                builder = builder.header("content-type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let resp = router.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn anlegen_und_flags_setzen() {
        let store = MemoryStore::new();
        let router = legacy_router(Arc::new(store.clone()));

        let (status, id) = anfrage(router.clone(), "POST", "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        let id = UserId::new(id);

        let (status, text) = anfrage(
            router.clone(),
            "PUT",
            &format!("/update-on-engagement/{id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "1 document updated");
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            UserStatus::Engaged
        );

        anfrage(router, "PUT", &format!("/leaving-user-update/{id}"), None).await;
        let record = store.get(&id).await.unwrap().unwrap();
        assert!(!record.active);
        assert_eq!(record.status, UserStatus::Available);
    }

    #[tokio::test]
    async fn unbekannte_kennung_ist_404() {
        let router = legacy_router(Arc::new(MemoryStore::new()));
        let (status, text) = anfrage(router, "PUT", "/update-on-next/gibtsnicht", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text.contains("message"));
    }

    #[tokio::test]
    async fn partnersuche_schliesst_sich_selbst_aus() {
        let store = MemoryStore::new();
        let router = legacy_router(Arc::new(store.clone()));
        let a = store.create_user().await.unwrap();

        let (status, text) = anfrage(
            router.clone(),
            "POST",
            "/api/remote-user-find",
            Some(json!({ "omeID": a })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "[]");

        let b = store.create_user().await.unwrap();
        let (_, text) = anfrage(
            router,
            "POST",
            "/api/get-next-user",
            Some(json!({ "omeID": a, "remoteUser": b })),
        )
        .await;
        let treffer: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(treffer, json!([{ "_id": b }]));
    }
}
