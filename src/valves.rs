pub(crate) mod backpressure;
pub(crate) mod batch;
pub(crate) mod enumerate;
pub(crate) mod errors;
pub(crate) mod filter_map;
pub(crate) mod flatten_iter;
pub(crate) mod map;
pub(crate) mod map_err;
pub(crate) mod skip;
pub(crate) mod take;
