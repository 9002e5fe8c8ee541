//! Gateway status codes carried in the second byte of a response frame.

/// Read-only status → description table, in wire order.
pub static STATUS_TABLE: [(u8, &str); 10] = [
    (0, "No errors encountered"),
    (1, "Processing error"),
    (2, "Missing device token"),
    (3, "Missing topic"),
    (4, "Missing payload"),
    (5, "Invalid token size"),
    (6, "Invalid topic size"),
    (7, "Invalid payload size"),
    (8, "Invalid token"),
    (255, "None (unknown)"),
];

/// Status code reported by the gateway when it rejects a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NoErrors,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Unknown,

    // Byte outside the table
    Unrecognized(u8),
}

impl StatusCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::NoErrors => 0,
            Self::ProcessingError => 1,
            Self::MissingDeviceToken => 2,
            Self::MissingTopic => 3,
            Self::MissingPayload => 4,
            Self::InvalidTokenSize => 5,
            Self::InvalidTopicSize => 6,
            Self::InvalidPayloadSize => 7,
            Self::InvalidToken => 8,
            Self::Unknown => 255,
            Self::Unrecognized(c) => *c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NoErrors,
            1 => Self::ProcessingError,
            2 => Self::MissingDeviceToken,
            3 => Self::MissingTopic,
            4 => Self::MissingPayload,
            5 => Self::InvalidTokenSize,
            6 => Self::InvalidTopicSize,
            7 => Self::InvalidPayloadSize,
            8 => Self::InvalidToken,
            255 => Self::Unknown,
            c => Self::Unrecognized(c),
        }
    }

    /// Human-readable description from [`STATUS_TABLE`].
    pub fn description(&self) -> &'static str {
        describe(self.code())
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Look up a raw status byte. Bytes outside the table get a generic text.
pub fn describe(code: u8) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
        .unwrap_or("Unrecognized status code")
}
