use crate::ids::GroupId;

/// Read/write authentication key pair for a namespace, when configured.
#[derive(Debug, Clone, Default)]
pub struct AuthKeys {
	pub read: Option<String>,
	pub write: Option<String>,
}

/// An owned handle to an opaque, embedder-produced per-namespace value.
///
/// Modeled as a scoped resource rather than a bare pointer: the core
/// guarantees exactly one `UserSettingsHandle` per snapshot per namespace,
/// that it outlives the snapshot, and that `release` runs exactly once, on
/// drop: a resource paired with an explicit teardown channel instead of an
/// implicit foreign destructor.
pub struct UserSettingsHandle<T> {
	value: Option<T>,
	release: Option<Box<dyn FnOnce(T) + Send>>,
}

impl<T> UserSettingsHandle<T> {
	pub fn new(value: T, release: impl FnOnce(T) + Send + 'static) -> Self {
		Self {
			value: Some(value),
			release: Some(Box::new(release)),
		}
	}

	/// A handle with no release action, for embedders that don't need scoped
	/// cleanup.
	pub fn without_release(value: T) -> Self {
		Self {
			value: Some(value),
			release: None,
		}
	}

	pub fn get(&self) -> &T {
		self.value.as_ref().expect("value taken before drop")
	}
}

impl<T> std::fmt::Debug for UserSettingsHandle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UserSettingsHandle")
			.field("present", &self.value.is_some())
			.finish()
	}
}

impl<T> Drop for UserSettingsHandle<T> {
	fn drop(&mut self) {
		if let (Some(value), Some(release)) = (self.value.take(), self.release.take()) {
			release(value);
		}
	}
}

/// Injected factory that turns a namespace's raw settings payload into an
/// opaque embedder value.
///
/// Returning `Ok(None)` means "the proxy is not interested in this
/// namespace": the snapshot is still stored, but [`crate::snapshot::NamespaceSnapshot::has_user_settings`]
/// reports `false` and callers computing cache-wide validity ignore it.
pub trait UserSettingsFactory: Send + Sync {
	type Value: Send + Sync + 'static;

	fn build(
		&self,
		namespace: &str,
		raw_settings: &serde_json::Value,
	) -> Result<Option<UserSettingsHandle<Self::Value>>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A factory that never produces a value; every namespace is treated as "not
/// interesting" to the embedder. Useful for tests and for embedders that
/// don't use the `user_settings` extension point at all.
pub struct NoUserSettings;

impl UserSettingsFactory for NoUserSettings {
	type Value = ();

	fn build(
		&self,
		_namespace: &str,
		_raw_settings: &serde_json::Value,
	) -> Result<Option<UserSettingsHandle<()>>, Box<dyn std::error::Error + Send + Sync>> {
		Ok(None)
	}
}

/// `{ name, groups_count, success_copies_policy, static_groups?, auth_keys?, user_settings? }`
pub struct NamespaceSettings<U> {
	pub name: String,
	pub groups_count: usize,
	pub success_copies_policy: String,
	pub static_groups: Vec<GroupId>,
	pub auth_keys: Option<AuthKeys>,
	pub user_settings: Option<UserSettingsHandle<U>>,
}

impl<U> NamespaceSettings<U> {
	pub fn groups_count(&self) -> usize {
		self.groups_count
	}

	pub fn success_copies_num(&self) -> &str {
		&self.success_copies_policy
	}

	pub fn user_settings(&self) -> Option<&U> {
		self.user_settings.as_ref().map(UserSettingsHandle::get)
	}
}

impl<U> std::fmt::Debug for NamespaceSettings<U> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NamespaceSettings")
			.field("name", &self.name)
			.field("groups_count", &self.groups_count)
			.field("success_copies_policy", &self.success_copies_policy)
			.field("static_groups", &self.static_groups)
			.field("has_user_settings", &self.user_settings.is_some())
			.finish()
	}
}
