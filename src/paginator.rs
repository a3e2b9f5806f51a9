//! Listing pagination.
//!
//! A [`Paginator`] splits an ordered list of endpoints into pages of
//! `per_page` and attaches a [`PaginatorPage`] to one endpoint per page. The
//! first page is the listing's own endpoint; every further page comes from
//! [`Endpoints::next_page`], so `/topics/` is followed by `/topics/page/2/`.
//!
//! [`get_links`] picks which page numbers a "jump to page" control shows
//! when there are too many to list. Links are dense around the current page
//! and spread out geometrically toward the first and last page:
//!
//! ```text
//! get_links(100, 50, 9) == [1, 29, 43, 49, 50, 51, 57, 72, 100]
//! ```

use crate::endpoint::{EndpointId, Endpoints};

/// Slots in the page-link control of listing templates.
pub const PAGE_LINK_SLOTS: usize = 9;

/// Pagination state attached to one listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatorPage {
    /// 1-based.
    pub page_num: usize,
    pub num_pages: usize,
    /// Half-open range of this page within the whole listing.
    pub start: usize,
    pub end: usize,
    pub items: Vec<EndpointId>,
    pub prev: Option<EndpointId>,
    pub next: Option<EndpointId>,
}

#[derive(Debug, Clone)]
pub struct Paginator {
    items: Vec<EndpointId>,
    per_page: usize,
}

impl Paginator {
    /// A `per_page` of 0 is treated as 1.
    pub fn new(items: Vec<EndpointId>, per_page: usize) -> Self {
        Self {
            items,
            per_page: per_page.max(1),
        }
    }

    pub fn num_of_pages(&self) -> usize {
        self.items.len().div_ceil(self.per_page)
    }

    /// Item range of the 0-based page `index`.
    pub fn page_range(&self, index: usize) -> (usize, usize) {
        let start = (index * self.per_page).min(self.items.len());
        let end = ((index + 1) * self.per_page).min(self.items.len());
        (start, end)
    }

    /// Attach a page to `base` and to each endpoint of its `next_page`
    /// chain. Returns the page endpoints in order. An empty listing still
    /// yields a first page.
    pub fn gen_all_pages(&self, endpoints: &mut Endpoints, base: EndpointId) -> Vec<EndpointId> {
        let num_pages = self.num_of_pages().max(1);
        let mut pages = Vec::with_capacity(num_pages);
        let mut current = base;
        for index in 0..num_pages {
            if index + 1 < num_pages {
                let next = endpoints.next_page(current);
                pages.push(current);
                current = next;
            } else {
                pages.push(current);
            }
        }
        for (index, &page) in pages.iter().enumerate() {
            let (start, end) = self.page_range(index);
            let endpoint = endpoints.get_mut(page);
            endpoint.page = Some(index);
            endpoint.paginator_page = Some(PaginatorPage {
                page_num: index + 1,
                num_pages,
                start,
                end,
                items: self.items[start..end].to_vec(),
                prev: index.checked_sub(1).map(|i| pages[i]),
                next: pages.get(index + 1).copied(),
            });
        }
        pages
    }
}

/// Page numbers (1-based, ascending) to show for `on_page` of `num_pages`
/// in at most `slots` links.
pub fn get_links(num_pages: usize, on_page: usize, slots: usize) -> Vec<usize> {
    if num_pages <= slots {
        return (1..=num_pages).collect();
    }
    let on_page = on_page.clamp(1, num_pages);
    if slots < 2 {
        return vec![on_page];
    }

    let pages_per_slot = (num_pages - 1) as f64 / (slots - 1) as f64;
    let left_pages = on_page - 1;
    let right_pages = num_pages - on_page;
    let mut left_slots = (left_pages as f64 / pages_per_slot).floor() as usize;
    let mut right_slots = (right_pages as f64 / pages_per_slot).floor() as usize;
    if left_slots + right_slots < slots - 1 {
        if on_page == 1 {
            right_slots += 1;
        } else if on_page == num_pages {
            left_slots += 1;
        } else if left_slots < right_slots {
            left_slots += 1;
        } else {
            right_slots += 1;
        }
    }

    let mut links: Vec<usize> = side_offsets(left_slots, left_pages)
        .into_iter()
        .map(|offset| on_page - offset)
        .collect();
    links.push(on_page);
    links.extend(
        side_offsets(right_slots, right_pages)
            .into_iter()
            .map(|offset| on_page + offset),
    );
    links.sort_unstable();
    links.dedup();
    links
}

/// Distances from the current page for one side: `slots` offsets spread
/// over `span` pages, closest first, the last one exactly `span`.
fn side_offsets(slots: usize, span: usize) -> Vec<usize> {
    match (slots, span) {
        (0, _) | (_, 0) => Vec::new(),
        (1, _) => vec![1],
        _ => {
            let exponent = (span as f64).ln() / (slots as f64).ln();
            (0..slots)
                .map(|k| {
                    if k + 1 == slots {
                        span
                    } else {
                        // floor((k+1)^e); powf can land just under an exact
                        // integer power, e.g. 2^(ln 8 / ln 2) as 7.999...
                        let offset = ((k + 1) as f64).powf(exponent) + 1e-9;
                        (offset.floor() as usize).clamp(1, span)
                    }
                })
                .collect()
        }
    }
}

/// One entry of a listing's page-link control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub number: usize,
    pub url: String,
    pub current: bool,
}

/// Page links for the listing page `id`, empty when it is not paginated.
pub fn page_links(endpoints: &Endpoints, id: EndpointId, slots: usize) -> Vec<PageLink> {
    let endpoint = endpoints.get(id);
    let Some(page) = &endpoint.paginator_page else {
        return Vec::new();
    };
    get_links(page.num_pages, page.page_num, slots)
        .into_iter()
        .map(|number| PageLink {
            number,
            url: crate::endpoint::format_url(&endpoint.components, Some(number - 1)),
            current: number == page.page_num,
        })
        .collect()
}
