//! Cursor-based pagination, per spec.md §4.5: "paginated via opaque
//! cursors `(since, until)` that are TAI timestamps; headers carry
//! `X-Paging-Since`, `X-Paging-Until`, `X-Paging-Limit` plus `Link` with
//! `rel=prev|next|first|last`."

use nmos_core::{Resource, Version};

#[derive(Clone, Copy, Debug, Default)]
pub struct PageRequest {
    pub since: Option<Version>,
    pub until: Option<Version>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Page {
    pub items: Vec<Resource>,
    pub since: Version,
    pub until: Version,
    pub limit: usize,
    pub has_more: bool,
}

/// Paginate an already-windowed, creation-ordered scan (see
/// `nmos_core::ResourceStore::scan_window`) down to `limit` entries,
/// reporting the `(since, until)` cursor pair the response headers should
/// carry. `candidates` must already be sorted by `created` ascending.
pub fn paginate(candidates: Vec<Resource>, request: PageRequest, default_limit: usize, max_limit: usize) -> Page {
    let limit = request
        .limit
        .unwrap_or(default_limit)
        .clamp(1, max_limit.max(1));

    let since = request.since.unwrap_or(
        candidates
            .first()
            .map(|r| r.created)
            .unwrap_or(Version(nmos_core::TaiTimestamp::ZERO)),
    );

    let has_more = candidates.len() > limit;
    let mut items = candidates;
    items.truncate(limit);

    let until = items
        .last()
        .map(|r| r.created)
        .unwrap_or(request.until.unwrap_or(since));

    Page {
        items,
        since,
        until,
        limit,
        has_more,
    }
}

/// `Link` header values for a page, per spec.md §4.5: `rel=prev|next|
/// first|last`. `first`/`last` anchor to the bounds of the caller's full
/// (unpaginated, but still filtered) candidate set, since a single page
/// can't derive them on its own; the caller is expected to have run an
/// unbounded scan alongside the paginated one to supply `window_first`
/// (the earliest item's cursor) and `window_last_page_since` (the cursor
/// that yields the final `limit`-sized page).
pub fn link_header(base_url: &str, page: &Page, window_first: Version, window_last_page_since: Version) -> String {
    let mut links = vec![
        format!(
            "<{base_url}?paging.since={}&paging.limit={}>; rel=\"prev\"",
            page.since, page.limit
        ),
        format!(
            "<{base_url}?paging.since={}&paging.limit={}>; rel=\"first\"",
            window_first, page.limit
        ),
        format!(
            "<{base_url}?paging.since={}&paging.limit={}>; rel=\"last\"",
            window_last_page_since, page.limit
        ),
    ];
    if page.has_more {
        links.push(format!(
            "<{base_url}?paging.since={}&paging.limit={}>; rel=\"next\"",
            page.until, page.limit
        ));
    }
    links.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmos_core::{Health, NodeData, ResourceData, ResourceId, TaiTimestamp};

    fn node_at(seconds: u64) -> Resource {
        Resource::new(
            ResourceId::random(),
            Version(TaiTimestamp::new(seconds, 0)),
            ResourceData::Node(NodeData {
                hostname: None,
                api_versions: vec![],
                href: "http://localhost".into(),
                services: vec![],
                extra: serde_json::Value::Null,
            }),
            Health::LastHeartbeat(0),
        )
    }

    #[test]
    fn truncates_to_limit_and_flags_more() {
        let candidates = vec![node_at(1), node_at(2), node_at(3)];
        let page = paginate(candidates, PageRequest { limit: Some(2), ..Default::default() }, 10, 100);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
    }

    #[test]
    fn no_more_when_under_limit() {
        let candidates = vec![node_at(1), node_at(2)];
        let page = paginate(candidates, PageRequest { limit: Some(10), ..Default::default() }, 10, 100);
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more);
    }

    #[test]
    fn link_header_carries_all_four_rels_when_there_is_a_next_page() {
        let candidates = vec![node_at(1), node_at(2), node_at(3)];
        let page = paginate(candidates, PageRequest { limit: Some(2), ..Default::default() }, 10, 100);
        let header = link_header("/nodes", &page, Version(TaiTimestamp::new(1, 0)), Version(TaiTimestamp::new(2, 0)));
        assert!(header.contains("rel=\"prev\""));
        assert!(header.contains("rel=\"next\""));
        assert!(header.contains("rel=\"first\""));
        assert!(header.contains("rel=\"last\""));
    }

    #[test]
    fn link_header_omits_next_on_the_final_page() {
        let candidates = vec![node_at(1), node_at(2)];
        let page = paginate(candidates, PageRequest { limit: Some(10), ..Default::default() }, 10, 100);
        let header = link_header("/nodes", &page, Version(TaiTimestamp::new(1, 0)), Version(TaiTimestamp::new(1, 0)));
        assert!(!header.contains("rel=\"next\""));
        assert!(header.contains("rel=\"first\""));
        assert!(header.contains("rel=\"last\""));
    }
}
