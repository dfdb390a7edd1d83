//! Per-request routing decision.

use piggybank_core::Request;
use url::Origin;

/// Strategy chosen for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host performs the request itself.
    Bypass,
    /// Network first, falling back to the stored document.
    Navigation,
    /// Cache first, filling from the network on a miss.
    CacheFirst,
}

/// Decide how to handle `request`.
///
/// Rules are evaluated in order: same-origin API calls bypass, navigations
/// go network-first, everything else goes cache-first.
pub fn classify(request: &Request, origin: &Origin, api_prefix: &str) -> Route {
    if request.is_same_origin(origin) && request.url.path().starts_with(api_prefix) {
        return Route::Bypass;
    }
    if request.is_navigation() {
        return Route::Navigation;
    }
    Route::CacheFirst
}
