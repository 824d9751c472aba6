// Copyright 2025 Cowboy AI, LLC.

//! Messages and operation results
//!
//! Every public operation of the engine reports through an
//! [`OperationResult`]: an ordered list of [`Message`]s, each with a stable
//! numeric code, a severity and text naming the role, member or composition
//! it is about. An operation succeeded exactly when no error is present.
//!
//! Code ranges:
//! - `1xx` informational notices
//! - `2xx` warnings
//! - `3xx` structural rejections of roles and role declarations
//! - `4xx` composition-time conflicts
//! - `5xx` external and internal failures

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a message is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Info,
    /// Should be addressed, does not fail the operation
    Warning,
    /// Fails the operation
    Error,
}

/// Stable message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageCode {
    /// Module already carries the mutation stamp
    AlreadyMutated,

    /// Public role field moved to the state container
    PublicFieldRelocated,
    /// Static role member moved to the code container
    StaticMemberRelocated,
    /// Placeholder does not match any role member
    PlaceholderUnmatched,
    /// Same role member excluded twice
    DoubleExclusion,
    /// Class member supersedes a concrete role member without being marked
    ImplicitSupersede,
    /// View member carries no marking and has no effect
    ViewMemberUnmarked,

    /// Role is not a class
    RoleNotAClass,
    /// Role derives from something other than the root type
    RoleWithBaseClass,
    /// Role has a parameterized constructor or more than one constructor
    RoleWithParameterizedConstructor,
    /// Role has an interop member
    RoleWithInteropMember,
    /// Role has a placeholder member
    RoleWithPlaceholder,
    /// Role explicitly implements a foreign contract member
    RoleWithExplicitImplementation,
    /// Role composes itself
    RoleComposesItself,
    /// Roles compose each other in a cycle
    RoleCompositionCycle,
    /// Role is instantiated directly
    RoleInstantiated,

    /// Same name used by different member kinds
    MemberKindClash,
    /// Same name and parameters with different return types
    SignatureConflict,
    /// More than one concrete implementation for one slot
    Conflict,
    /// Every candidate of a slot is excluded
    AllMembersExcluded,
    /// Abstract role member left without implementation
    AbstractMemberNotImplemented,
    /// Same role member aliased twice
    DoubleAliasing,
    /// Self-type argument is not the composition type
    SelfTypeMismatch,
    /// View is not a pure contract
    ViewNotAContract,
    /// View references zero or several roles
    ViewRoleCount,
    /// View member matches no member of its role
    ViewMemberNotFound,
    /// Role composed as an open type parameter
    OpenTypeParameterRole,
    /// Composed type is neither a role nor a view
    UnknownRole,
    /// More than one member marked as superseding the same slot
    SupersedeConflict,

    /// External verifier could not run
    VerifierUnavailable,
    /// External verifier did not finish in time
    VerifierTimeout,
    /// External verifier reported an invalid module
    VerificationFailed,
    /// Unexpected failure inside the engine
    InternalError,
}

impl MessageCode {
    /// Every code, in numeric order
    pub const ALL: [MessageCode; 33] = [
        MessageCode::AlreadyMutated,
        MessageCode::PublicFieldRelocated,
        MessageCode::StaticMemberRelocated,
        MessageCode::PlaceholderUnmatched,
        MessageCode::DoubleExclusion,
        MessageCode::ImplicitSupersede,
        MessageCode::ViewMemberUnmarked,
        MessageCode::RoleNotAClass,
        MessageCode::RoleWithBaseClass,
        MessageCode::RoleWithParameterizedConstructor,
        MessageCode::RoleWithInteropMember,
        MessageCode::RoleWithPlaceholder,
        MessageCode::RoleWithExplicitImplementation,
        MessageCode::RoleComposesItself,
        MessageCode::RoleCompositionCycle,
        MessageCode::RoleInstantiated,
        MessageCode::MemberKindClash,
        MessageCode::SignatureConflict,
        MessageCode::Conflict,
        MessageCode::AllMembersExcluded,
        MessageCode::AbstractMemberNotImplemented,
        MessageCode::DoubleAliasing,
        MessageCode::SelfTypeMismatch,
        MessageCode::ViewNotAContract,
        MessageCode::ViewRoleCount,
        MessageCode::ViewMemberNotFound,
        MessageCode::OpenTypeParameterRole,
        MessageCode::UnknownRole,
        MessageCode::SupersedeConflict,
        MessageCode::VerifierUnavailable,
        MessageCode::VerifierTimeout,
        MessageCode::VerificationFailed,
        MessageCode::InternalError,
    ];

    /// Stable numeric code
    pub fn number(self) -> u32 {
        match self {
            MessageCode::AlreadyMutated => 101,

            MessageCode::PublicFieldRelocated => 201,
            MessageCode::StaticMemberRelocated => 202,
            MessageCode::PlaceholderUnmatched => 203,
            MessageCode::DoubleExclusion => 204,
            MessageCode::ImplicitSupersede => 205,
            MessageCode::ViewMemberUnmarked => 206,

            MessageCode::RoleNotAClass => 301,
            MessageCode::RoleWithBaseClass => 302,
            MessageCode::RoleWithParameterizedConstructor => 303,
            MessageCode::RoleWithInteropMember => 304,
            MessageCode::RoleWithPlaceholder => 305,
            MessageCode::RoleWithExplicitImplementation => 306,
            MessageCode::RoleComposesItself => 307,
            MessageCode::RoleCompositionCycle => 308,
            MessageCode::RoleInstantiated => 309,

            MessageCode::MemberKindClash => 401,
            MessageCode::SignatureConflict => 402,
            MessageCode::Conflict => 403,
            MessageCode::AllMembersExcluded => 404,
            MessageCode::AbstractMemberNotImplemented => 405,
            MessageCode::DoubleAliasing => 406,
            MessageCode::SelfTypeMismatch => 407,
            MessageCode::ViewNotAContract => 408,
            MessageCode::ViewRoleCount => 409,
            MessageCode::ViewMemberNotFound => 410,
            MessageCode::OpenTypeParameterRole => 411,
            MessageCode::UnknownRole => 412,
            MessageCode::SupersedeConflict => 413,

            MessageCode::VerifierUnavailable => 501,
            MessageCode::VerifierTimeout => 502,
            MessageCode::VerificationFailed => 503,
            MessageCode::InternalError => 504,
        }
    }

    /// Default severity of the code
    pub fn severity(self) -> Severity {
        match self.number() {
            100..=199 => Severity::Info,
            200..=299 => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Look up a code by its number
    pub fn from_number(number: u32) -> Option<MessageCode> {
        Self::ALL.iter().copied().find(|c| c.number() == number)
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity() {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
        };
        write!(f, "{prefix}{:03}", self.number())
    }
}

/// A single diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable code
    pub code: MessageCode,
    /// Severity (the code's default unless escalated)
    pub severity: Severity,
    /// Human-readable text
    pub text: String,
}

impl Message {
    /// Create a message with the code's default severity
    pub fn new(code: MessageCode, text: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            text: text.into(),
        }
    }

    /// Stable numeric code
    pub fn number(&self) -> u32 {
        self.code.number()
    }

    /// Whether this is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether this is a warning
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.text)
    }
}

/// Messages accumulated by an operation
///
/// Passed explicitly through every phase; phases add to it and the
/// orchestrator merges the results of sub-operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    messages: Vec<Message>,
}

impl OperationResult {
    /// Create an empty (successful) result
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no error is present
    pub fn success(&self) -> bool {
        !self.messages.iter().any(Message::is_error)
    }

    /// All messages in the order they were reported
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Add a message
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Add a message built from a code and text
    pub fn report(&mut self, code: MessageCode, text: impl Into<String>) {
        self.add(Message::new(code, text));
    }

    /// Append every message of another result
    pub fn merge(&mut self, other: OperationResult) {
        self.messages.extend(other.messages);
    }

    /// Error messages
    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_error())
    }

    /// Warning messages
    pub fn warnings(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_warning())
    }

    /// Whether a message with the code is present
    pub fn has(&self, code: MessageCode) -> bool {
        self.messages.iter().any(|m| m.code == code)
    }

    /// Messages with the code
    pub fn with_code(&self, code: MessageCode) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.code == code)
    }

    /// Numeric codes of all messages, in order
    pub fn numbers(&self) -> Vec<u32> {
        self.messages.iter().map(Message::number).collect()
    }

    /// Turn every warning into an error. Returns how many were escalated.
    pub fn escalate_warnings(&mut self) -> usize {
        let mut escalated = 0;
        for message in &mut self.messages {
            if message.severity == Severity::Warning {
                message.severity = Severity::Error;
                escalated += 1;
            }
        }
        escalated
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing was reported
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}
