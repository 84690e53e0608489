pub const DEFAULT_SERVER: &str = "http://nginx.jim01.dev";
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "http://login.jim01.dev/oauth/Authorize/";
pub const DEFAULT_REDIRECT_URI: &str = "https://jimpurbrick.github.com/contactjs/";
pub const DEFAULT_CLIENT_ID: &str = "contactjs";
pub const DEFAULT_SCOPES: &str = "personalContactsRead personalContactsWrite corporationContactsRead corporationContactsWrite characterRead";

pub const POLL_CHECK_INTERVAL_MS: u64 = 1000;
pub const RECONNECT_LINE_THRESHOLD: usize = 100;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;
pub const MAX_BACKOFF_SECS: u64 = 30;
/// Bytes of a non-success notification body kept for the error message.
pub const ERROR_BODY_LIMIT: usize = 4096;

pub const MEDIA_API: &str = "vnd.ccp.eve.Api-v1";
pub const MEDIA_CHARACTER: &str = "vnd.ccp.eve.Character-v1";
pub const MEDIA_CONTACT_COLLECTION: &str = "vnd.ccp.eve.ContactCollection-v1";
pub const MEDIA_CONTACT_CREATE: &str = "vnd.ccp.eve.ContactCreate-v1";
pub const MEDIA_COLLECTION: &str = "vnd.ccp.eve.Collection-v1";
pub const NOTIFICATION_ACCEPT: &str =
    "application/vnd.ccp.eve.OnContactUpdate-v1+json, application/vnd.ccp.eve.OnContactDelete-v1+json";

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const CSRF_FILE_SUFFIX: &str = "csrftoken";
pub const APP_DIR_NAME: &str = "crest-contacts";
