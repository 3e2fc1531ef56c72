/// Shared constants for the submission pipeline and its HTTP boundary.

// Pitch name bounds (after trimming)
pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 200;

// Direct-upload credential lifetime
pub const DEFAULT_UPLOAD_TTL_SECS: u64 = 3600;
// SigV4 presigned URLs are rejected beyond seven days
pub const MAX_UPLOAD_TTL_SECS: u64 = 604_800;

// Completion webhook
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

// Svix sends the same scheme under its own prefix
pub const SVIX_ID_HEADER: &str = "svix-id";
pub const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SVIX_SIGNATURE_HEADER: &str = "svix-signature";

pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";
pub const WEBHOOK_SIGNATURE_VERSION: &str = "v1";

// Server defaults
pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_CONFIG_PATH: &str = "quickpitch.toml";
pub const DEFAULT_DATABASE_PATH: &str = "data/quickpitch.db";
pub const DEFAULT_BUCKET: &str = "storage-quickpitch";
pub const DEFAULT_QUEUE_FILE: &str = "data/queue/jobs.ndjson";
pub const DEFAULT_LOCAL_STORAGE_ROOT: &str = "data/objects";
pub const DEFAULT_SESSION_URL: &str = "http://localhost:3000/api/auth/get-session";

// Local upload route body cap
pub const MAX_LOCAL_UPLOAD_BYTES: usize = 256 * 1024 * 1024;
pub const REQUEST_ID_HEADER: &str = "x-request-id";
