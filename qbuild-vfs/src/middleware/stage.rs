/// Where a middleware sits in the chain. Calls enter the outermost stage
/// first, so a logging layer sees every request, cache hits included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[default]
    Outer,
    /// Closest to the backend.
    Caching,
}
