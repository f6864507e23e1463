//! Lookup of hyperlink relations inside resource bodies

use crate::error::LinkNotFound;
use crate::types::Link;

/// Return the first link whose relation equals `rel` exactly.
///
/// Matching is case-sensitive and duplicates are not collapsed: when several
/// records share a relation, the earliest one wins.
///
/// # Errors
///
/// Returns [`LinkNotFound`] when no record carries the relation, which lets
/// callers tell a missing relation apart from a transport failure.
///
/// # Examples
///
/// ```
/// use scaleio_core::{find_link, Link};
///
/// let links = vec![Link::new("self", "/api/instances/Volume::1")];
/// assert_eq!(find_link(&links, "self").unwrap().href, "/api/instances/Volume::1");
/// assert!(find_link(&links, "parent").is_err());
/// ```
pub fn find_link<'a>(links: &'a [Link], rel: &str) -> Result<&'a Link, LinkNotFound> {
    links
        .iter()
        .find(|link| link.rel == rel)
        .ok_or_else(|| LinkNotFound {
            rel: rel.to_string(),
        })
}
