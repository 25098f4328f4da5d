use thiserror::Error;

/// Fatal configuration-time failures.
///
/// Everything that can go wrong on the packet path is recorded in counters
/// or queued as a decoder/stream event instead; only registry setup and
/// per-thread binding return errors, and the embedder decides whether to
/// terminate on them.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("codec {0}: ctor() must be implemented")]
    MissingCtor(&'static str),

    #[error("codec {0}: dtor() must be implemented")]
    MissingDtor(&'static str),

    #[error("a maximum of 255 codecs can be registered")]
    TooManyCodecs,

    #[error("codec name {0:?} is already registered")]
    DuplicateName(String),

    #[error("no codec matches data link type {0}")]
    NoGrinder(i32),

    #[error("codecs have not been instantiated yet")]
    NotInstantiated,
}

/// Failures while cloning a packet for re-inspection.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("source packet has no decoded layers")]
    NoLayers,

    #[error("header span of {0} bytes exceeds the reserved link headroom")]
    HeadroomExceeded(usize),
}
