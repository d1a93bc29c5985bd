//! Domain wrappers for remote bases, tables, views, and the policy knobs of
//! the upload and clear operations.

use std::{fmt, ops::Deref, time::Duration};

use verdant_core::TableName;

/// Records accepted by one batch write.
pub const MAX_BATCH_LEN: usize = 10;

/// Pause between consecutive batch writes and record deletes.
///
/// A fixed pacing interval is sufficient admission control for the remote
/// service's documented per-minute rate limit.
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);

/// Trigger-and-verify rounds before a table is reported unresolved.
pub const DEFAULT_CLEAR_ATTEMPTS: usize = 5;

/// Pause between firing the deletion triggers and verifying emptiness.
pub const DEFAULT_CLEAR_SETTLE: Duration = Duration::from_secs(5);

/// Pause after the final verification round.
pub const DEFAULT_CLEAR_COOLDOWN: Duration = Duration::from_secs(10);

/// Base URL of the remote table API.
///
/// # Examples
/// ```
/// # use verdant_data::airtable::ApiBaseUrl;
/// let url = ApiBaseUrl::new("https://api.airtable.com/v0");
/// assert_eq!(url.as_ref(), "https://api.airtable.com/v0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBaseUrl(String);

impl ApiBaseUrl {
    /// Construct a new [`ApiBaseUrl`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for ApiBaseUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ApiBaseUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ApiBaseUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ApiBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a remote base (the service's unit of tenancy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseId(String);

impl BaseId {
    /// Construct a new [`BaseId`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for BaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for BaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a saved view used to filter a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewId(String);

impl ViewId {
    /// Construct a new [`ViewId`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for ViewId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ViewId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deletion-trigger endpoint of one table.
///
/// The endpoint schedules an asynchronous clear; a 2xx acceptance confirms
/// delivery, not completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookUrl(String);

impl WebhookUrl {
    /// Construct a new [`WebhookUrl`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for WebhookUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for WebhookUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A table addressed within its base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// The base holding the table.
    pub base: BaseId,
    /// The table name or id.
    pub table: TableName,
}

impl TableRef {
    /// Construct a reference from a base and table.
    #[must_use]
    pub fn new(base: BaseId, table: TableName) -> Self {
        Self { base, table }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.table)
    }
}

/// Options controlling one batched upload.
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use verdant_data::airtable::UploadOptions;
/// let options = UploadOptions::new()
///     .with_insert_geo(true)
///     .with_delete_all(true)
///     .with_pacing(Duration::ZERO);
/// assert!(options.insert_geo);
/// assert!(options.delete_all);
/// assert_eq!(options.pacing, Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Keep the geometry column, serialised as well-known text.
    pub insert_geo: bool,
    /// Clear the destination table before writing.
    pub delete_all: bool,
    /// Pause after each batch write.
    pub pacing: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            insert_geo: false,
            delete_all: false,
            pacing: DEFAULT_PACING,
        }
    }
}

impl UploadOptions {
    /// Construct options with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle geometry serialisation.
    #[must_use]
    pub fn with_insert_geo(mut self, insert_geo: bool) -> Self {
        self.insert_geo = insert_geo;
        self
    }

    /// Toggle clearing the destination before writing.
    #[must_use]
    pub fn with_delete_all(mut self, delete_all: bool) -> Self {
        self.delete_all = delete_all;
        self
    }

    /// Override the pacing interval.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Policy bounding the trigger-and-verify clear cycle.
///
/// The settle interval doubles after every unsuccessful round, and the whole
/// cycle gives up after `max_attempts` rounds rather than retrying forever
/// against a deletion hook that never completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearPolicy {
    /// Trigger-and-verify rounds before giving up.
    pub max_attempts: usize,
    /// Initial pause between triggering and verifying, doubled per round.
    pub settle: Duration,
    /// Pause after the final round.
    pub cooldown: Duration,
}

impl Default for ClearPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CLEAR_ATTEMPTS,
            settle: DEFAULT_CLEAR_SETTLE,
            cooldown: DEFAULT_CLEAR_COOLDOWN,
        }
    }
}

impl ClearPolicy {
    /// Construct the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the initial settle interval.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Override the cooldown interval.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// One table scheduled for clearing, paired with its deletion trigger.
///
/// A target without a configured trigger is still verified (the table may
/// already be empty) but nothing can schedule its deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearTarget {
    /// The table to clear.
    pub table: TableRef,
    /// The table's deletion-trigger endpoint, when configured.
    pub webhook: Option<WebhookUrl>,
}

impl ClearTarget {
    /// Construct a target from its table and optional trigger.
    #[must_use]
    pub fn new(table: TableRef, webhook: Option<WebhookUrl>) -> Self {
        Self { table, webhook }
    }
}
