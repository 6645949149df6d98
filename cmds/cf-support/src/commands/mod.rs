pub mod collect;
pub mod gitops;
pub mod onprem;
pub mod oss;
pub mod pipelines;

pub mod util;
