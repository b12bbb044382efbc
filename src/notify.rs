//! Scan notification sound, played through the desktop notification
//! service's `sound-name` hint.
//!
//! The notification carries a fixed summary and no body; scanned payloads
//! never leave the application through it.

use std::collections::HashMap;
use std::thread;

use log::{debug, warn};
use zbus::{proxy, zvariant::Value, Connection};

use crate::config::APP_NAME;

const SOUND_NAME: &str = "message-new-instant";
const EXPIRE_MS: i32 = 3000;
const SUMMARY: &str = "Đã quét mã";

#[proxy(
    default_service = "org.freedesktop.Notifications",
    interface = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// hints:
    ///     sound-name: str
    ///     urgency: byte (0 low, 1 normal, 2 critical)
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

pub struct SoundNotifier {
    enabled: bool,
}

impl SoundNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Fire and forget; the D-Bus round trip runs off the UI thread.
    pub fn play(&self) {
        if !self.enabled {
            return;
        }
        let spawned = thread::Builder::new()
            .name("notify".to_string())
            .spawn(|| match futures::executor::block_on(send()) {
                Ok(id) => debug!("notification {id} sent"),
                Err(e) => warn!("notification failed: {e}"),
            });
        if let Err(e) = spawned {
            warn!("notification thread: {e}");
        }
    }
}

async fn send() -> zbus::Result<u32> {
    let conn = Connection::session().await?;
    let proxy = NotificationsProxy::new(&conn).await?;
    let values = hint_values();
    let hints: HashMap<&str, &Value<'_>> = values.iter().map(|(key, value)| (*key, value)).collect();
    proxy
        .notify(APP_NAME, 0, "scanner", SUMMARY, "", &[], hints, EXPIRE_MS)
        .await
}

/// Sound, low urgency, and kept out of the notification history.
fn hint_values() -> [(&'static str, Value<'static>); 3] {
    [
        ("sound-name", Value::from(SOUND_NAME)),
        ("transient", Value::from(true)),
        ("urgency", Value::from(0u8)),
    ]
}
