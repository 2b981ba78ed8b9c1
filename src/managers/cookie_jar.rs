use tower_cookies::{Cookie, Cookies};

/// The request/response cookie jar the session manager reads and writes
pub trait CookieJar: Send + Sync {
    /// Value of the named cookie, if the client sent one
    fn value(&self, name: &str) -> Option<String>;
    fn add(&self, cookie: Cookie<'static>);
    fn remove(&self, cookie: Cookie<'static>);
}

impl CookieJar for Cookies {
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(|cookie| cookie.value().to_string())
    }

    fn add(&self, cookie: Cookie<'static>) {
        Cookies::add(self, cookie)
    }

    fn remove(&self, cookie: Cookie<'static>) {
        Cookies::remove(self, cookie)
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryJar;
