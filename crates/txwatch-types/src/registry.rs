//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every pluggable implementation (storage backend, pool source, announcement
/// source) provides a `Registry` struct naming the key it is configured under
/// and the factory that builds it, e.g. `"memory"` for
/// `[storage.implementations.memory]` or `"rpc"` for a pool source.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
