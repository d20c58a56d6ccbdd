//! Router assembly and the serve loop.

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tracing::info;

use crate::{
    contacts, dashboard, dispatch, export, media, messages, reminders, replies, session_routes,
    state::AppState,
};

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/dispatch/list", post(dispatch::send_list))
        .route("/api/dispatch/segment", post(dispatch::send_segment))
        .route("/api/dispatch/broadcast", post(dispatch::send_broadcast))
        .route("/api/dispatch/campaign", post(dispatch::send_campaign))
        .route("/api/send/audio", post(media::send_audio))
        .route("/api/send/image", post(media::send_image))
        .route("/api/send/document", post(media::send_document))
        .route("/api/contacts", get(contacts::list))
        .route("/api/contacts/import", post(contacts::import))
        .route("/api/contacts/{address}/label", put(contacts::set_label))
        .route("/api/contacts/{address}/note", put(contacts::set_note))
        .route("/api/contacts/{address}/name", put(contacts::rename))
        .route("/api/contacts/{address}", delete(contacts::delete))
        .route("/api/messages", get(messages::recent))
        .route("/api/messages/{address}", get(messages::conversation))
        .route("/api/reminders", post(reminders::create))
        .route("/api/reminders/upcoming", get(reminders::upcoming))
        .route("/api/reminders/{id}", put(reminders::update))
        .route("/api/reminders/{id}", delete(reminders::delete))
        .route("/api/reminders/{id}/complete", post(reminders::complete))
        .route("/api/reminders/for/{address}", get(reminders::list_for))
        .route("/api/quick-replies", get(replies::list))
        .route("/api/quick-replies", post(replies::create))
        .route("/api/quick-replies/{id}", put(replies::update))
        .route("/api/quick-replies/{id}", delete(replies::delete))
        .route("/api/session", get(session_routes::status))
        .route("/api/notify", get(session_routes::latest_notification))
        .route("/api/notify", delete(session_routes::clear_notification))
        .route("/api/campaigns/{locale}", get(session_routes::campaigns))
        .route("/api/export.csv", get(export::contacts_csv))
        .route("/api/dashboard/metrics", get(dashboard::metrics))
        .route("/api/dashboard/labels", get(dashboard::labels))
        .route("/api/dashboard/activity", get(dashboard::activity))
        .route("/api/dashboard/activity-weekly", get(dashboard::activity_weekly))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!(%bind, port, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        async_trait::async_trait,
        axum::{
            Json,
            extract::{Path, State},
        },
        bytes::Bytes,
        futures::stream::BoxStream,
        sqlx::sqlite::SqlitePoolOptions,
        tokio::sync::mpsc,
        tokio_util::sync::CancellationToken,
    };

    use {
        recado_common::types::{Address, Direction},
        recado_dispatch::{CampaignCatalog, OutboundDispatcher, Pacing},
        recado_inbound::{FsBlobStore, NotificationSlot},
        recado_session::{
            ChatClient, ChatSummary, ClientEvent, Credentials, DownloadRef, MediaKind,
            MessageSender, SendPayload, SessionManager, SessionState, Timing,
        },
        recado_store::{ContactRegistry, MessageStore, NewMessage, QuickReplyStore, ReminderStore},
    };

    use super::*;
    use crate::{contacts, session_routes};

    struct StubClient;

    #[async_trait]
    impl ChatClient for StubClient {
        async fn connect(
            &self,
            _credentials: Option<Credentials>,
        ) -> anyhow::Result<mpsc::Receiver<ClientEvent>> {
            anyhow::bail!("not used")
        }
        async fn send(&self, _address: &Address, _payload: &SendPayload) -> anyhow::Result<()> {
            Ok(())
        }
        async fn download(
            &self,
            _reference: &DownloadRef,
            _kind: MediaKind,
        ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>> {
            anyhow::bail!("not used")
        }
        async fn list_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
            Ok(Vec::new())
        }
    }

    async fn test_state() -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        recado_store::run_migrations(&pool).await.unwrap();
        let registry = ContactRegistry::new(pool.clone());
        let messages = MessageStore::new(pool.clone());
        let reminders = ReminderStore::new(pool.clone());
        let session = SessionManager::new(
            Arc::new(StubClient),
            Arc::new(NullCreds),
            registry.clone(),
            Timing::default(),
        );
        let catalog = Arc::new(
            CampaignCatalog::parse("[es]\nbienvenida = [\"Hola.\"]\n", "es").unwrap(),
        );
        let dispatcher = Arc::new(OutboundDispatcher::new(
            Arc::clone(&session) as Arc<dyn MessageSender>,
            registry.clone(),
            messages.clone(),
            Arc::clone(&catalog),
            Pacing::default(),
        ));
        AppState {
            pool: pool.clone(),
            registry,
            messages,
            reminders,
            quick_replies: QuickReplyStore::new(pool),
            dispatcher,
            catalog,
            session,
            notifications: Arc::new(NotificationSlot::new()),
            blobs: Arc::new(FsBlobStore::new(std::env::temp_dir())),
            default_country_code: Some("52".into()),
            shutdown: CancellationToken::new(),
        }
    }

    struct NullCreds;

    #[async_trait]
    impl recado_session::CredentialStore for NullCreds {
        async fn load(&self) -> recado_session::Result<Option<Credentials>> {
            Ok(None)
        }
        async fn save(&self, _credentials: &Credentials) -> recado_session::Result<()> {
            Ok(())
        }
        async fn clear(&self) -> recado_session::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn session_status_starts_disconnected() {
        let state = test_state().await;
        let Json(status) = session_routes::status(State(state)).await;
        assert_eq!(status.state, SessionState::Disconnected);
        assert!(status.qr.is_none());
    }

    #[tokio::test]
    async fn import_normalizes_and_counts_invalid_numbers() {
        let state = test_state().await;
        let Json(result) = contacts::import(
            State(state.clone()),
            Json(contacts::ImportBody {
                numbers: vec![
                    "55 1234 5678".into(),
                    "5512345678".into(),
                    "123".into(),
                ],
            }),
        )
        .await
        .unwrap();

        // The two well-formed entries normalize to the same address.
        assert_eq!(result.summary.created, 1);
        assert_eq!(result.summary.existing, 1);
        assert_eq!(result.invalid, 1);

        let address = Address::parse("525512345678@s.whatsapp.net").unwrap();
        assert!(state.registry.get(&address).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dispatch_without_session_maps_to_conflict() {
        let state = test_state().await;
        let err = dispatch::send_list(
            State(state),
            Json(dispatch::ListBody {
                targets: vec!["5512345678".into()],
                message: "hola".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_contact_maps_to_not_found() {
        let state = test_state().await;
        let err = contacts::set_note(
            State(state),
            Path("5512345678".to_string()),
            Json(contacts::SetNoteBody {
                note: "llamar mañana".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_address_maps_to_bad_request() {
        let state = test_state().await;
        let err = contacts::delete(State(state), Path("abc".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn campaign_listing_uses_locale_fallback() {
        let state = test_state().await;
        let Json(names) =
            session_routes::campaigns(State(state), Path("pt".to_string())).await;
        assert_eq!(names, vec!["bienvenida"]);
    }

    fn media_body(content_base64: &str) -> media::MediaBody {
        media::MediaBody {
            to: "5512345678".into(),
            content_base64: content_base64.into(),
            mime: "audio/ogg".into(),
            caption: None,
            file_name: None,
        }
    }

    #[tokio::test]
    async fn media_send_rejects_malformed_content() {
        let state = test_state().await;
        let err = media::send_audio(State(state), Json(media_body("not base64!!")))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn media_send_without_session_maps_to_conflict() {
        use base64::Engine as _;
        let state = test_state().await;
        let content = base64::engine::general_purpose::STANDARD.encode(b"ogg-bytes");
        let err = media::send_audio(State(state), Json(media_body(&content)))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn broadcast_without_session_maps_to_conflict() {
        let state = test_state().await;
        let err = dispatch::send_broadcast(
            State(state),
            Json(dispatch::BroadcastBody {
                message: "aviso".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn quick_reply_crud_rejects_empty_text() {
        let state = test_state().await;

        let Json(created) = replies::create(
            State(state.clone()),
            Json(replies::ReplyBody {
                text: "Gracias por escribir.".into(),
            }),
        )
        .await
        .unwrap();

        let Json(listed) = replies::list(State(state.clone())).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        let err = replies::create(
            State(state.clone()),
            Json(replies::ReplyBody { text: "   ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let err = replies::update(
            State(state),
            Path(created.id + 100),
            Json(replies::ReplyBody {
                text: "otro texto".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn weekly_activity_counts_messages_and_conversations() {
        let state = test_state().await;
        let a = Address::parse("5215511112222@s.whatsapp.net").unwrap();
        let b = Address::parse("5215533334444@s.whatsapp.net").unwrap();
        for (address, body) in [(&a, "hola"), (&a, "sigo aquí"), (&b, "buenas")] {
            state
                .messages
                .append(NewMessage::text(address.clone(), Direction::Inbound, body))
                .await
                .unwrap();
        }

        let Json(days) = dashboard::activity_weekly(State(state)).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].messages, 3);
        assert_eq!(days[0].conversations, 2);
    }
}
