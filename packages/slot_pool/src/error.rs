use std::borrow::Cow;
use std::panic::Location;

use derive_more::Display;
use thiserror::Error;

/// The category of an [`Error`] returned by the slot pool.
///
/// Callers are expected to branch on the kind only. The description attached to the error is
/// intended for humans and its contents may change between versions.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An internal invariant was violated. Observing this indicates a bug in the pool itself.
    #[display("internal logic error")]
    BadLogic,

    /// The operation requires an initialized allocator but [`initialize()`][1] has not been
    /// called (or the allocator has since been deinitialized).
    ///
    /// [1]: crate::SlotAllocator::initialize
    #[display("allocator is not initialized")]
    NotInitialized,

    /// [`initialize()`][1] was called on an allocator that is already initialized.
    ///
    /// [1]: crate::SlotAllocator::initialize
    #[display("allocator is already initialized")]
    AlreadyInitialized,

    /// The system allocator refused to provide the backing storage block.
    #[display("cannot reserve system memory")]
    CannotReserveSystemMemory,

    /// There are fewer free slots than the operation requires.
    #[display("not enough space in allocator")]
    NotEnoughSpace,

    /// The code constructing a value for a slot panicked.
    #[display("constructor panicked")]
    ConstructorPanicked,

    /// The code constructing a value for a slot returned an error.
    #[display("constructor failed")]
    ConstructorFailed,

    /// The destructor of a value stored in a slot panicked.
    #[display("destructor panicked")]
    DestructorPanicked,

    /// A bucket was indexed beyond its length.
    #[display("index out of bounds")]
    OutOfBounds,
}

/// An error returned by a fallible slot pool operation.
///
/// Carries an [`ErrorKind`], a human-readable description and the source location at which
/// the error was raised.
#[derive(Clone, Debug, Error)]
#[error("{kind}: {description} (at {location})")]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
    location: &'static Location<'static>,
}

impl Error {
    #[must_use]
    #[track_caller]
    pub(crate) fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
            location: Location::caller(),
        }
    }

    /// The kind of the error. This is what callers should inspect to decide how to react.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Free-text diagnostic description of what went wrong.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Where in the slot pool the error was raised.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

/// A specialized `Result` type for slot pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
