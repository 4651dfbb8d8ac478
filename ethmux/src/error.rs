use std::fmt;

pub type Errno = nix::errno::Errno;

/// A boxed error type for device backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for driver startup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while bringing the driver up.
///
/// Nothing at steady state produces an `Error`: runtime failures are reported
/// through [`RxStatus`](crate::RxStatus), [`TxStatus`](crate::TxStatus) and
/// the drop counters in [`Stats`](crate::Stats).
#[derive(Debug)]
pub enum Error {
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// Two tenants were configured with the same id.
    DuplicateTenant(u32),
    /// More tenants than `MAX_TENANTS` were configured.
    TooManyTenants(usize),
    /// Mapping DMA memory failed.
    DmaMap(Errno),
    /// The device backend rejected its configuration.
    Device(BoxError),
    /// `start()` was called twice.
    AlreadyStarted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(what) => write!(f, "invalid driver config: {what}"),
            Error::DuplicateTenant(id) => write!(f, "tenant id {id} configured twice"),
            Error::TooManyTenants(n) => write!(f, "{n} tenants exceed the compiled-in limit"),
            Error::DmaMap(e) => write!(f, "failed to map DMA memory: {e}"),
            Error::Device(e) => write!(f, "device configuration failed: {e}"),
            Error::AlreadyStarted => write!(f, "driver already started"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DmaMap(e) => Some(e),
            Error::Device(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::DmaMap(e)
    }
}

/// Why an inbound frame (or a fan-out copy of one) was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No free buffer in the pool.
    PoolExhausted,
    /// The target tenant's inbound queue is full.
    QueueFull,
    /// Destination matched no tenant and was not broadcast.
    NoMatchingTenant,
    /// Frame shorter than a destination address.
    Runt,
    /// Completion referenced no hardware-owned buffer, or carried no data.
    MalformedInput,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::PoolExhausted => write!(f, "buffer pool exhausted"),
            DropReason::QueueFull => write!(f, "tenant queue full"),
            DropReason::NoMatchingTenant => write!(f, "no matching tenant"),
            DropReason::Runt => write!(f, "frame shorter than address field"),
            DropReason::MalformedInput => write!(f, "malformed completion"),
        }
    }
}
