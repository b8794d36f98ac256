//! Session state: who is identified, with which token, and the timer that
//! refreshes that token ahead of expiry.

mod controller;
pub mod token;

pub use controller::SessionController;
pub use token::{AuthenticateOptions, JwtClaims, RefreshTokenCallback};

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::core::{ScheduledTask, TaskCallback};
use crate::utils::{now_millis, now_secs, Logger};

#[derive(Clone, Default)]
pub struct Session {
    pub distinct_id: Option<String>,
    pub user_token: Option<String>,
    pub refresh_callback: Option<RefreshTokenCallback>,
}

pub struct SessionState {
    session: RwLock<Session>,
    refresh_task: Mutex<Option<ScheduledTask>>,
    refresh_lead: Duration,
    logger: Arc<Logger>,
}

impl SessionState {
    pub fn new(refresh_lead: Duration, logger: Arc<Logger>) -> Arc<Self> {
        Arc::new(Self {
            session: RwLock::new(Session::default()),
            refresh_task: Mutex::new(None),
            refresh_lead,
            logger,
        })
    }

    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    pub fn distinct_id(&self) -> Option<String> {
        self.session.read().distinct_id.clone()
    }

    pub fn user_token(&self) -> Option<String> {
        self.session.read().user_token.clone()
    }

    pub fn is_identified(&self) -> bool {
        self.session.read().distinct_id.is_some()
    }

    pub fn has_refresh_timer(&self) -> bool {
        self.refresh_task
            .lock()
            .as_ref()
            .is_some_and(|task| task.is_active())
    }

    /// Starts a session for `distinct_id`.
    pub(crate) fn begin(
        self: &Arc<Self>,
        distinct_id: &str,
        user_token: Option<String>,
        refresh_callback: Option<RefreshTokenCallback>,
    ) {
        {
            let mut session = self.session.write();
            session.distinct_id = Some(distinct_id.to_string());
            session.user_token = user_token;
            session.refresh_callback = refresh_callback;
        }
        self.arm_refresh();
    }

    /// Swaps the token of the current session and re-arms the refresh timer.
    /// A `None` callback keeps the one already installed.
    pub(crate) fn update_token(
        self: &Arc<Self>,
        user_token: Option<String>,
        refresh_callback: Option<RefreshTokenCallback>,
    ) {
        {
            let mut session = self.session.write();
            session.user_token = user_token;
            if refresh_callback.is_some() {
                session.refresh_callback = refresh_callback;
            }
        }
        self.arm_refresh();
    }

    pub(crate) fn clear(&self) {
        *self.session.write() = Session::default();
        if let Some(mut task) = self.refresh_task.lock().take() {
            task.cancel();
        }
    }

    fn arm_refresh(self: &Arc<Self>) {
        let mut slot = self.refresh_task.lock();
        if let Some(mut task) = slot.take() {
            task.cancel();
        }

        let (token, has_callback) = {
            let session = self.session.read();
            (session.user_token.clone(), session.refresh_callback.is_some())
        };
        let Some(token) = token else {
            return;
        };
        if !has_callback {
            return;
        }

        let exp = match token::decode_jwt(&token) {
            Ok(claims) => token::expiry_secs(&claims),
            Err(e) => {
                self.logger.warn(format!("[SuprSend]: Couldn't decode JWT token: {}", e));
                return;
            }
        };
        let Some(delay) =
            exp.and_then(|exp| token::refresh_delay(exp, now_millis(), self.refresh_lead))
        else {
            return;
        };

        let weak = Arc::downgrade(self);
        let callback: TaskCallback = Arc::new(move || {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                if let Some(state) = weak.upgrade() {
                    state.run_scheduled_refresh().await;
                }
            })
        });

        // Fires once; only a fresh token from the callback arms the next one.
        *slot = Some(ScheduledTask::once("token-refresh", delay, callback));
    }

    async fn run_scheduled_refresh(self: &Arc<Self>) {
        let Session {
            distinct_id,
            user_token,
            refresh_callback,
        } = self.snapshot();
        let (Some(distinct_id), Some(token), Some(callback)) =
            (distinct_id, user_token, refresh_callback)
        else {
            return;
        };

        let claims = match token::decode_jwt(&token) {
            Ok(claims) => claims,
            Err(_) => {
                self.logger.warn("[SuprSend]: Couldn't decode JWT token");
                return;
            }
        };

        let Some(new_token) =
            token::refresh_with_retry(&callback, &token, &claims, &self.logger).await
        else {
            return;
        };

        self.apply_refreshed_token(&distinct_id, new_token);
    }

    /// Refreshes the token once if it has expired. Failures are logged and
    /// swallowed; the caller proceeds with whatever token is current.
    pub(crate) async fn refresh_if_expired(self: &Arc<Self>) {
        let Session {
            distinct_id,
            user_token,
            refresh_callback,
        } = self.snapshot();
        let (Some(distinct_id), Some(token), Some(callback)) =
            (distinct_id, user_token, refresh_callback)
        else {
            return;
        };

        if !token::is_expired(&token, now_secs() as f64) {
            return;
        }

        let claims = token::decode_jwt(&token).unwrap_or_default();
        match callback(token, claims).await {
            Ok(Some(new_token)) => self.apply_refreshed_token(&distinct_id, new_token),
            Ok(None) => {}
            Err(e) => {
                self.logger
                    .warn(format!("[SuprSend]: Couldn't refresh expired userToken: {}", e));
            }
        }
    }

    fn apply_refreshed_token(self: &Arc<Self>, distinct_id: &str, new_token: String) {
        // Ignore refreshes that finish after a reset or a new login.
        if self.distinct_id().as_deref() != Some(distinct_id) {
            return;
        }
        if self.user_token().as_deref() == Some(new_token.as_str()) {
            return;
        }
        tracing::debug!("Applying refreshed user token");
        self.update_token(Some(new_token), None);
    }
}
