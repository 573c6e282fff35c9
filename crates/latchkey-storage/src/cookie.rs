//! Cookie-backed storage adapter.
//!
//! Hosts that persist session state in cookies implement [`CookieJar`] over
//! their request/response lifecycle; [`CookieStore`] renders the typed
//! [`StorageAttributes`] into standard cookie attribute pairs on the way in.

use crate::{StorageAttributes, StorageResult, TokenStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Minimal jar interface a hosting context provides.
///
/// `write` receives a fully rendered `name=value; Attr; Attr=...` cookie
/// string; `read` returns the raw value for a cookie name.
pub trait CookieJar: Send + Sync {
    fn read(&self, name: &str) -> StorageResult<Option<String>>;
    fn write(&self, rendered: &str) -> StorageResult<()>;
}

/// Render a cookie string from a name, value and attribute bag.
fn render_cookie(name: &str, value: &str, attrs: Option<&StorageAttributes>) -> String {
    let mut parts = vec![format!("{name}={value}")];
    if let Some(attrs) = attrs {
        if let Some(max_age) = attrs.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        } else if let Some(expires) = attrs.expires {
            parts.push(format!("Expires={}", expires.to_rfc2822()));
        }
        if let Some(path) = &attrs.path {
            parts.push(format!("Path={path}"));
        }
        if let Some(same_site) = attrs.same_site {
            parts.push(format!("SameSite={}", same_site.as_str()));
        }
        if attrs.secure {
            parts.push("Secure".to_string());
        }
        if attrs.http_only {
            parts.push("HttpOnly".to_string());
        }
    }
    parts.join("; ")
}

/// Storage adapter over a [`CookieJar`].
pub struct CookieStore {
    jar: Box<dyn CookieJar>,
}

impl CookieStore {
    pub fn new(jar: Box<dyn CookieJar>) -> Self {
        Self { jar }
    }
}

#[async_trait]
impl TokenStore for CookieStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.jar.read(key)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        attrs: Option<&StorageAttributes>,
    ) -> StorageResult<()> {
        self.jar.write(&render_cookie(key, value, attrs))
    }

    async fn remove(&self, key: &str, attrs: Option<&StorageAttributes>) -> StorageResult<()> {
        // Removal is an expired write; keep Path/SameSite so the right
        // cookie is targeted.
        let mut expired = attrs.cloned().unwrap_or_default();
        expired.max_age = Some(std::time::Duration::from_secs(0));
        expired.expires = None;
        self.jar.write(&render_cookie(key, "", Some(&expired)))
    }
}

/// In-process jar keeping the last rendered cookie per name.
///
/// Useful for tests and for hosts that flush cookies out-of-band at the end
/// of a request.
#[derive(Default)]
pub struct MemoryJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full rendered cookie string for a name, if any.
    pub fn rendered(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }
}

impl CookieJar for MemoryJar {
    fn read(&self, name: &str) -> StorageResult<Option<String>> {
        let cookies = self.cookies.lock().unwrap();
        let Some(rendered) = cookies.get(name) else {
            return Ok(None);
        };
        // Max-Age=0 means the cookie was cleared.
        if rendered.contains("Max-Age=0") {
            return Ok(None);
        }
        let value = rendered
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, v)| v.to_string());
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn write(&self, rendered: &str) -> StorageResult<()> {
        let name = rendered
            .split('=')
            .next()
            .unwrap_or_default()
            .to_string();
        self.cookies
            .lock()
            .unwrap()
            .insert(name, rendered.to_string());
        Ok(())
    }
}
