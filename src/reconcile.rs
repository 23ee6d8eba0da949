//! Set reconciliation for set-valued resource attributes.
//!
//! Tags, bound instances, domain entries and similar attributes live on the
//! remote object as sets converged through dedicated add/remove endpoints.
//! The reconciler computes the minimal add/remove delta between the
//! previous and desired sets, then issues remove-then-add in that order so
//! that replace-in-place (a changed tag value under the same key) lands
//! correctly.
//!
//! The two calls are not atomic. A failure between remove and add leaves
//! the remote set partially converged (for tags: empty); the next apply
//! converges it again. Callers who cannot tolerate the window need a
//! control-plane-side batch API.

use std::hash::Hash;

use async_trait::async_trait;

use crate::error::ProviderError;

/// The delta converging a previous set toward a desired set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetDiff<T> {
    /// Members of the desired set not already present.
    pub to_add: Vec<T>,
    /// Present members no longer desired.
    pub to_remove: Vec<T>,
}

impl<T> SetDiff<T> {
    /// Whether the sets already agree.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What makes a member "already present".
///
/// Tags compare by full key/value pair, so a changed value under the same
/// key appears in both halves of the diff. Opaque ID sets compare the same
/// way because the ID is the whole value. Some endpoints treat the identity
/// key alone as membership (re-adding under the same key overwrites); those
/// use [`KeyOnly`](MemberEquality::KeyOnly) to skip the redundant calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEquality {
    /// A member is present only if an identical value is present.
    FullValue,
    /// A member is present if any value with the same identity key is.
    KeyOnly,
}

/// Compute the delta between `previous` and `desired`.
///
/// `key` projects a member to its identity key; it is only consulted under
/// [`MemberEquality::KeyOnly`].
pub fn diff_members<T, K, F>(
    previous: &[T],
    desired: &[T],
    equality: MemberEquality,
    key: F,
) -> SetDiff<T>
where
    T: Clone + PartialEq,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let present = |member: &T, others: &[T]| match equality {
        MemberEquality::FullValue => others.contains(member),
        MemberEquality::KeyOnly => {
            let wanted = key(member);
            others.iter().any(|o| key(o) == wanted)
        }
    };

    SetDiff {
        to_add: desired
            .iter()
            .filter(|d| !present(d, previous))
            .cloned()
            .collect(),
        to_remove: previous
            .iter()
            .filter(|p| !present(p, desired))
            .cloned()
            .collect(),
    }
}

/// A tag: key plus value, compared as a full pair.
pub type Tag = (String, String);

/// Diff two tag sets. A key whose value changed shows up in `to_remove`
/// (old pair) and `to_add` (new pair).
pub fn diff_tags(previous: &[Tag], desired: &[Tag]) -> SetDiff<Tag> {
    diff_members(previous, desired, MemberEquality::FullValue, |t| {
        t.0.clone()
    })
}

/// Diff two sets of opaque IDs.
pub fn diff_ids(previous: &[String], desired: &[String]) -> SetDiff<String> {
    diff_members(previous, desired, MemberEquality::FullValue, Clone::clone)
}

/// The remote add/remove calls for one set-valued attribute.
#[async_trait]
pub trait SetOps<T: Send + Sync>: Send + Sync {
    /// Add `members` to the remote set.
    async fn add(&self, members: &[T]) -> Result<(), ProviderError>;
    /// Remove `members` from the remote set.
    async fn remove(&self, members: &[T]) -> Result<(), ProviderError>;
}

/// Apply a diff through `ops`: remove first, then add.
///
/// Membership is idempotent from the orchestrator's point of view even when
/// the remote API is not: removing an absent member (NotFound) and adding a
/// present one (Conflict) are absorbed.
pub async fn sync<T: Send + Sync>(
    ops: &dyn SetOps<T>,
    diff: &SetDiff<T>,
) -> Result<(), ProviderError> {
    if !diff.to_remove.is_empty() {
        match ops.remove(&diff.to_remove).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!("members already absent during removal");
            }
            Err(err) => return Err(err.in_step("error removing set members")),
        }
    }
    if !diff.to_add.is_empty() {
        match ops.add(&diff.to_add).await {
            Ok(()) => {}
            Err(ProviderError::Conflict(msg)) => {
                tracing::debug!(%msg, "members already present during addition");
            }
            Err(err) => return Err(err.in_step("error adding set members")),
        }
    }
    Ok(())
}
