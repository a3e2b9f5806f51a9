//! Ordered endpoint collections.
//!
//! A [`PageStore`] is an ordered list of endpoint ids with set-like
//! `add`/`remove`. Every query returns a new store and leaves the receiver
//! untouched; only [`PageStore::annotate_nav`] writes back to the arena.
//!
//! ## Series ordering
//!
//! A document joins a taxonomy either unordered (`"topics/rust" = true`) or
//! as a numbered part (`"series/intro" = 2`). [`PageStore::filter_by_topic`]
//! puts numbered parts first, ascending, then the unordered members, and
//! insists the parts read 1, 2, 3, ... with no gap or repeat.

use crate::endpoint::{EndpointId, Endpoints};
use chrono::Datelike;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("'{topic}' part {part} is claimed by both {first} and {second}")]
    DuplicatePart {
        topic: String,
        part: u32,
        first: String,
        second: String,
    },
    #[error("{identifier}: '{topic}' part {found} leaves a gap, expected part {expected}")]
    Gap {
        topic: String,
        identifier: String,
        expected: u32,
        found: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStore {
    items: Vec<EndpointId>,
}

impl FromIterator<EndpointId> for PageStore {
    fn from_iter<I: IntoIterator<Item = EndpointId>>(iter: I) -> Self {
        let mut store = PageStore::new();
        store.extend(iter);
        store
    }
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless already present.
    pub fn add(&mut self, id: EndpointId) {
        if !self.items.contains(&id) {
            self.items.push(id);
        }
    }

    pub fn remove(&mut self, id: EndpointId) {
        self.items.retain(|item| *item != id);
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = EndpointId>) {
        for id in ids {
            self.add(id);
        }
    }

    /// This store followed by the members of `other` not already in it.
    pub fn concat(&self, other: &PageStore) -> PageStore {
        let mut merged = self.clone();
        merged.extend(other.iter());
        merged
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.items.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.items.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<EndpointId> {
        self.items.clone()
    }

    fn filtered(&self, keep: impl Fn(EndpointId) -> bool) -> PageStore {
        PageStore {
            items: self.iter().filter(|id| keep(*id)).collect(),
        }
    }

    fn sorted_by(&self, compare: impl FnMut(&EndpointId, &EndpointId) -> Ordering) -> PageStore {
        let mut items = self.items.clone();
        items.sort_by(compare);
        PageStore { items }
    }

    /// Dated endpoints by date, undated ones after them in current order.
    pub fn order_by_date(&self, endpoints: &Endpoints, descending: bool) -> PageStore {
        self.sorted_by(|a, b| {
            let (da, db) = (endpoints.get(*a).listing.date, endpoints.get(*b).listing.date);
            match (da, db) {
                (Some(da), Some(db)) if descending => db.cmp(&da),
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }

    pub fn order_by_title(&self, endpoints: &Endpoints, descending: bool) -> PageStore {
        self.sorted_by(|a, b| {
            let ta = endpoints.get(*a).listing.title.to_lowercase();
            let tb = endpoints.get(*b).listing.title.to_lowercase();
            if descending { tb.cmp(&ta) } else { ta.cmp(&tb) }
        })
    }

    /// Content only, newest first, undated last.
    pub fn recent(&self, endpoints: &Endpoints) -> PageStore {
        self.filtered(|id| endpoints.get(id).is_content())
            .order_by_date(endpoints, true)
    }

    pub fn only_dated(&self, endpoints: &Endpoints) -> PageStore {
        self.filtered(|id| endpoints.get(id).listing.date.is_some())
    }

    pub fn only_taxonomies(&self, endpoints: &Endpoints) -> PageStore {
        self.filtered(|id| endpoints.get(id).is_taxonomy())
    }

    pub fn exclude_taxonomies(&self, endpoints: &Endpoints) -> PageStore {
        self.filtered(|id| !endpoints.get(id).is_taxonomy())
    }

    /// Dated endpoints by `(year, month)`, each group in current order.
    pub fn group_by_date(&self, endpoints: &Endpoints) -> BTreeMap<(i32, u32), PageStore> {
        let mut groups: BTreeMap<(i32, u32), PageStore> = BTreeMap::new();
        for id in self.iter() {
            if let Some(date) = endpoints.get(id).listing.date {
                groups
                    .entry((date.year(), date.month()))
                    .or_default()
                    .add(id);
            }
        }
        groups
    }

    /// Members of `topic`: numbered parts ascending, then unordered members
    /// in current order. Parts must run 1, 2, 3, ... without repeats.
    pub fn filter_by_topic(&self, endpoints: &Endpoints, topic: &str) -> Result<PageStore, StoreError> {
        let mut parts: BTreeMap<u32, EndpointId> = BTreeMap::new();
        let mut unordered = Vec::new();
        for id in self.iter() {
            match endpoints.get(id).listing.taxonomies.get(topic) {
                Some(Some(part)) => {
                    if let Some(first) = parts.insert(*part, id) {
                        return Err(StoreError::DuplicatePart {
                            topic: topic.to_string(),
                            part: *part,
                            first: endpoints.identifier(first),
                            second: endpoints.identifier(id),
                        });
                    }
                }
                Some(None) => unordered.push(id),
                None => {}
            }
        }
        for (expected, (&part, &id)) in (1..).zip(parts.iter()) {
            if part != expected {
                return Err(StoreError::Gap {
                    topic: topic.to_string(),
                    identifier: endpoints.identifier(id),
                    expected,
                    found: part,
                });
            }
        }
        Ok(PageStore {
            items: parts.into_values().chain(unordered).collect(),
        })
    }

    /// Listing order of a taxonomy page: series parts in order, then child
    /// taxonomies by title, then dated members newest first, then the rest.
    pub fn list_view_sort(&self, endpoints: &Endpoints, topic: &str) -> Result<PageStore, StoreError> {
        let members = self.filter_by_topic(endpoints, topic)?;
        let is_part = |id: EndpointId| {
            matches!(
                endpoints.get(id).listing.taxonomies.get(topic),
                Some(Some(_))
            )
        };
        let series = members.filtered(is_part);
        let rest = members.filtered(|id| !is_part(id));
        let taxonomies = rest.only_taxonomies(endpoints).order_by_title(endpoints, false);
        let pages = rest.exclude_taxonomies(endpoints);
        let dated = pages.only_dated(endpoints).order_by_date(endpoints, true);
        let undated = pages.filtered(|id| endpoints.get(id).listing.date.is_none());
        Ok(series.concat(&taxonomies).concat(&dated).concat(&undated))
    }

    /// Link consecutive members: in a newest-first store `prev` is the
    /// older neighbour and `next` the newer one.
    pub fn annotate_nav(&self, endpoints: &mut Endpoints, descending: bool) {
        let ordered = self.order_by_date(endpoints, descending);
        let items = &ordered.items;
        for (index, &id) in items.iter().enumerate() {
            let before = index.checked_sub(1).map(|i| items[i]);
            let after = items.get(index + 1).copied();
            let endpoint = endpoints.get_mut(id);
            if descending {
                endpoint.prev = after;
                endpoint.next = before;
            } else {
                endpoint.prev = before;
                endpoint.next = after;
            }
        }
    }
}
