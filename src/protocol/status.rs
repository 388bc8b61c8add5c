//! Guacamole protocol status codes.
//!
//! These match the official Apache Guacamole protocol specification and are
//! carried by `ack`, `error`, and `end`-adjacent instructions to communicate
//! stream and connection outcomes.

use std::fmt;

/// Status of a Guacamole stream or connection operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation succeeded (0x0000)
    Success,
    /// The requested operation is unsupported (0x0100)
    Unsupported,
    /// Internal server error (0x0200)
    ServerError,
    /// The server is busy (0x0201)
    ServerBusy,
    /// The upstream server timed out (0x0202)
    UpstreamTimeout,
    /// The upstream server returned an error (0x0203)
    UpstreamError,
    /// The requested resource does not exist (0x0204)
    ResourceNotFound,
    /// The requested resource is already in use (0x0205)
    ResourceConflict,
    /// The requested resource is closed (0x0206)
    ResourceClosed,
    /// The upstream server does not appear to exist (0x0207)
    UpstreamNotFound,
    /// The upstream server is refusing connections (0x0208)
    UpstreamUnavailable,
    /// The session conflicted with another session (0x0209)
    SessionConflict,
    /// The session timed out (0x020A)
    SessionTimeout,
    /// The session was forcibly closed (0x020B)
    SessionClosed,
    /// Bad request from the client (0x0300)
    ClientBadRequest,
    /// The client is unauthorized (0x0301)
    ClientUnauthorized,
    /// The client is forbidden (0x0303)
    ClientForbidden,
    /// The client took too long (0x0308)
    ClientTimeout,
    /// The client sent too much data (0x030D)
    ClientOverrun,
    /// The client sent data of an unsupported type (0x030F)
    ClientBadType,
    /// Too many clients are already connected (0x031D)
    ClientTooMany,
}

impl Status {
    /// Numeric Guacamole status code.
    pub fn code(self) -> u32 {
        match self {
            Status::Success => 0x0000,
            Status::Unsupported => 0x0100,
            Status::ServerError => 0x0200,
            Status::ServerBusy => 0x0201,
            Status::UpstreamTimeout => 0x0202,
            Status::UpstreamError => 0x0203,
            Status::ResourceNotFound => 0x0204,
            Status::ResourceConflict => 0x0205,
            Status::ResourceClosed => 0x0206,
            Status::UpstreamNotFound => 0x0207,
            Status::UpstreamUnavailable => 0x0208,
            Status::SessionConflict => 0x0209,
            Status::SessionTimeout => 0x020A,
            Status::SessionClosed => 0x020B,
            Status::ClientBadRequest => 0x0300,
            Status::ClientUnauthorized => 0x0301,
            Status::ClientForbidden => 0x0303,
            Status::ClientTimeout => 0x0308,
            Status::ClientOverrun => 0x030D,
            Status::ClientBadType => 0x030F,
            Status::ClientTooMany => 0x031D,
        }
    }

    /// Map a numeric Guacamole status code to a [`Status`].
    ///
    /// Codes outside the published table map to [`Status::ServerError`].
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000 => Status::Success,
            0x0100 => Status::Unsupported,
            0x0200 => Status::ServerError,
            0x0201 => Status::ServerBusy,
            0x0202 => Status::UpstreamTimeout,
            0x0203 => Status::UpstreamError,
            0x0204 => Status::ResourceNotFound,
            0x0205 => Status::ResourceConflict,
            0x0206 => Status::ResourceClosed,
            0x0207 => Status::UpstreamNotFound,
            0x0208 => Status::UpstreamUnavailable,
            0x0209 => Status::SessionConflict,
            0x020A => Status::SessionTimeout,
            0x020B => Status::SessionClosed,
            0x0300 => Status::ClientBadRequest,
            0x0301 => Status::ClientUnauthorized,
            0x0303 => Status::ClientForbidden,
            0x0308 => Status::ClientTimeout,
            0x030D => Status::ClientOverrun,
            0x030F => Status::ClientBadType,
            0x031D => Status::ClientTooMany,
            _ => Status::ServerError,
        }
    }

    /// Protocol name of the status.
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Unsupported => "UNSUPPORTED",
            Status::ServerError => "SERVER_ERROR",
            Status::ServerBusy => "SERVER_BUSY",
            Status::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Status::UpstreamError => "UPSTREAM_ERROR",
            Status::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Status::ResourceConflict => "RESOURCE_CONFLICT",
            Status::ResourceClosed => "RESOURCE_CLOSED",
            Status::UpstreamNotFound => "UPSTREAM_NOT_FOUND",
            Status::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Status::SessionConflict => "SESSION_CONFLICT",
            Status::SessionTimeout => "SESSION_TIMEOUT",
            Status::SessionClosed => "SESSION_CLOSED",
            Status::ClientBadRequest => "CLIENT_BAD_REQUEST",
            Status::ClientUnauthorized => "CLIENT_UNAUTHORIZED",
            Status::ClientForbidden => "CLIENT_FORBIDDEN",
            Status::ClientTimeout => "CLIENT_TIMEOUT",
            Status::ClientOverrun => "CLIENT_OVERRUN",
            Status::ClientBadType => "CLIENT_BAD_TYPE",
            Status::ClientTooMany => "CLIENT_TOO_MANY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.name(), self.code())
    }
}
