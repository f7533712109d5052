/// Utility module
///
/// Small building blocks shared by the warehouse and batch jobs:
/// - Streaming content digests with cancellation (hash.rs)
/// - Path resolution and filesystem probes (paths.rs)
pub mod hash;
pub mod paths;
