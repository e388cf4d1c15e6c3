//! OAuth flow constants
//!
//! Fixed pieces of the redirect endpoint and the consent prompt. Nothing in
//! here is secret; client credentials always come from the caller.

use std::time::Duration;

/// Address the redirect listener binds to. Port 0 lets the OS pick a free port.
pub const BIND_ADDR: &str = "127.0.0.1:0";

/// Host placed in the redirect URL handed to the authorization server.
pub const REDIRECT_HOST: &str = "localhost";

/// Fixed path of the redirect handler.
pub const REDIRECT_PATH: &str = "/exchange";

/// Scope list historically sent before the caller's scopes. Always replaced by
/// the caller's list in the final authorization URL (later value wins).
pub const DEFAULT_SCOPES: &str = "activity:read_all,profile:read_all,read_all";

/// Number of answers accepted by the yes/no prompt before giving up.
pub const PROMPT_ATTEMPTS: u32 = 3;

/// How long the redirect listener gets to finish in-flight responses on shutdown.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Access tokens are treated as expired this long before their actual expiry.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(10);

/// Body returned to the browser once a code has been captured.
pub const SUCCESS_BODY: &str =
    "Code successfully received, you can close this tab and go back to your terminal";

/// Body returned when the redirect's state does not match the pending request.
pub const STATE_MISMATCH_BODY: &str =
    "The returned state does not match the one set for this redirect service.";

/// Body returned for redirects arriving after the code was already delivered.
pub const ALREADY_RECEIVED_BODY: &str =
    "An authorization code was already received for this request.";
