//! Internal utilities.

pub(crate) mod det_hash;

pub(crate) use det_hash::DetHasher;
