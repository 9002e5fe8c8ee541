//! Gateway endpoints and client tuning.

use std::time::Duration;

use apns_protocol::MAX_PAGE_SIZE;

pub const PRODUCTION_GATEWAY_HOST: &str = "gateway.push.apple.com";
pub const SANDBOX_GATEWAY_HOST: &str = "gateway.sandbox.push.apple.com";
pub const NOTIFICATION_PORT: u16 = 2195;

pub const PRODUCTION_FEEDBACK_HOST: &str = "feedback.push.apple.com";
pub const SANDBOX_FEEDBACK_HOST: &str = "feedback.sandbox.push.apple.com";
pub const FEEDBACK_PORT: u16 = 2196;

/// Which gateway pair to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn from_sandbox_flag(use_sandbox: bool) -> Self {
        if use_sandbox { Self::Sandbox } else { Self::Production }
    }

    pub fn gateway(&self) -> Endpoint {
        match self {
            Self::Sandbox => Endpoint::new(SANDBOX_GATEWAY_HOST, NOTIFICATION_PORT),
            Self::Production => Endpoint::new(PRODUCTION_GATEWAY_HOST, NOTIFICATION_PORT),
        }
    }

    pub fn feedback(&self) -> Endpoint {
        match self {
            Self::Sandbox => Endpoint::new(SANDBOX_FEEDBACK_HOST, FEEDBACK_PORT),
            Self::Production => Endpoint::new(PRODUCTION_FEEDBACK_HOST, FEEDBACK_PORT),
        }
    }
}

/// Host and port of a TLS endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Push client configuration.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub environment: Environment,
    /// Notification gateway
    pub gateway: Endpoint,
    /// Feedback service
    pub feedback: Endpoint,
    /// Maximum notifications per connection session (1..=8999)
    pub page_size: usize,
    /// Delay after each write so a rejection can arrive before the next one
    pub pacing: Duration,
    /// Added to the send time to form the notification expiry
    pub expiry_offset: Duration,
    /// Wait before closing a session so late rejections are still read
    pub disconnect_grace: Duration,
    /// Time allowed for the rest of a response frame once its first byte arrived
    pub response_read_timeout: Duration,
    /// Feedback entries older than this many months are dropped
    pub feedback_retention_months: u32,
}

impl PushConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            gateway: environment.gateway(),
            feedback: environment.feedback(),
            page_size: MAX_PAGE_SIZE,
            pacing: Duration::from_secs(1),
            expiry_offset: Duration::from_secs(300 * 60),
            disconnect_grace: Duration::from_millis(500),
            response_read_timeout: Duration::from_millis(100),
            feedback_retention_months: 12,
        }
    }

    pub fn sandbox() -> Self {
        Self::new(Environment::Sandbox)
    }

    pub fn production() -> Self {
        Self::new(Environment::Production)
    }

    pub fn for_environment(use_sandbox: bool) -> Self {
        Self::new(Environment::from_sandbox_flag(use_sandbox))
    }

    pub fn with_gateway(mut self, endpoint: Endpoint) -> Self {
        self.gateway = endpoint;
        self
    }

    pub fn with_feedback(mut self, endpoint: Endpoint) -> Self {
        self.feedback = endpoint;
        self
    }

    /// Page size is clamped to `1..=8999` so correlation ids stay four digits.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    pub fn with_response_read_timeout(mut self, timeout: Duration) -> Self {
        self.response_read_timeout = timeout;
        self
    }

    pub fn with_feedback_retention_months(mut self, months: u32) -> Self {
        self.feedback_retention_months = months;
        self
    }

    /// Effective page size, clamped even if the field was set directly.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::production()
    }
}
