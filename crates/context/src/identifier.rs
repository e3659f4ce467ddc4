//! Scope identity.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Process-unique scope id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

struct IdentifierInner {
	id: ScopeId,
	name: Arc<str>,
	parent: Option<ScopeIdentifier>,
	trace_id: Uuid,
}

/// A node in the scope tree.
///
/// Root identifiers mint a fresh trace id; children inherit it.
#[derive(Clone)]
pub struct ScopeIdentifier {
	inner: Arc<IdentifierInner>,
}

impl ScopeIdentifier {
	pub fn root(name: impl AsRef<str>) -> Self {
		Self {
			inner: Arc::new(IdentifierInner {
				id: ScopeId::next(),
				name: Arc::from(name.as_ref()),
				parent: None,
				trace_id: Uuid::new_v4(),
			}),
		}
	}

	pub fn child(&self, name: impl AsRef<str>) -> Self {
		Self {
			inner: Arc::new(IdentifierInner {
				id: ScopeId::next(),
				name: Arc::from(name.as_ref()),
				parent: Some(self.clone()),
				trace_id: self.inner.trace_id,
			}),
		}
	}

	pub fn id(&self) -> ScopeId {
		self.inner.id
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn parent(&self) -> Option<&ScopeIdentifier> {
		self.inner.parent.as_ref()
	}

	pub fn is_root(&self) -> bool {
		self.inner.parent.is_none()
	}

	pub fn trace_id(&self) -> Uuid {
		self.inner.trace_id
	}

	/// Iterates from this scope up to the root.
	pub fn ancestors(&self) -> impl Iterator<Item = &ScopeIdentifier> {
		std::iter::successors(Some(self), |scope| scope.parent())
	}

	pub fn root_scope(&self) -> &ScopeIdentifier {
		self.ancestors().last().unwrap_or(self)
	}

	/// Number of ancestors; zero for a root.
	pub fn depth(&self) -> usize {
		self.ancestors().count() - 1
	}

	/// Slash-separated names from the root, e.g. `app/request/fetch`.
	pub fn path(&self) -> String {
		let mut names: Vec<&str> = self.ancestors().map(ScopeIdentifier::name).collect();
		names.reverse();
		names.join("/")
	}
}

impl PartialEq for ScopeIdentifier {
	fn eq(&self, other: &Self) -> bool {
		self.id() == other.id()
	}
}

impl Eq for ScopeIdentifier {}

impl fmt::Debug for ScopeIdentifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopeIdentifier")
			.field("id", &self.inner.id)
			.field("path", &self.path())
			.field("trace_id", &self.inner.trace_id)
			.finish()
	}
}

impl fmt::Display for ScopeIdentifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.name(), self.id())
	}
}
