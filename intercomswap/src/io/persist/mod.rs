// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

pub mod sqlite_store;
pub mod types;

use std::io;
use std::path::{Component, Path, PathBuf};

/// Default receipts database filename under the `onchain/` root.
pub const DEFAULT_RECEIPTS_DB_FILE: &str = "receipts.sqlite";

/// Resolves an operator-provided database path against the repo-local
/// `onchain/` root. Paths escaping that subtree are rejected.
pub fn resolve_db_path(onchain_root: &Path, requested: Option<&str>) -> io::Result<PathBuf> {
	let requested = match requested {
		None => return Ok(onchain_root.join(DEFAULT_RECEIPTS_DB_FILE)),
		Some(r) => Path::new(r),
	};

	let resolved = if requested.is_absolute() {
		requested.to_path_buf()
	} else {
		onchain_root.join(requested)
	};

	if !resolved.starts_with(onchain_root)
		|| resolved.components().any(|c| matches!(c, Component::ParentDir))
	{
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			format!(
				"receipts path {:?} escapes the onchain root {:?}",
				requested, onchain_root
			),
		));
	}
	Ok(resolved)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn db_paths_are_jailed_to_onchain_root() {
		let root = Path::new("/repo/onchain");

		assert_eq!(
			resolve_db_path(root, None).unwrap(),
			PathBuf::from("/repo/onchain/receipts.sqlite")
		);
		assert_eq!(
			resolve_db_path(root, Some("peer/receipts.sqlite")).unwrap(),
			PathBuf::from("/repo/onchain/peer/receipts.sqlite")
		);
		assert_eq!(
			resolve_db_path(root, Some("/repo/onchain/op.sqlite")).unwrap(),
			PathBuf::from("/repo/onchain/op.sqlite")
		);

		assert!(resolve_db_path(root, Some("../outside.sqlite")).is_err());
		assert!(resolve_db_path(root, Some("/etc/passwd")).is_err());
		assert!(resolve_db_path(root, Some("nested/../../outside.sqlite")).is_err());
	}
}
