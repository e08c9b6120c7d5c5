//! Length-aware page over one executed search.
use scout_core::error::{Error, Result};
use scout_core::types::{Meta, Record};
use std::rc::Rc;

use crate::result::{Hit, SearchResult};

/// Which materialization `items()` hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemView {
    #[default]
    Hits,
    Records,
    Documents,
}

pub enum PageItems<'a> {
    Hits(&'a [Hit]),
    Records(Vec<Rc<Record>>),
    Documents(Vec<Meta>),
}

impl PageItems<'_> {
    pub fn len(&self) -> usize {
        match self {
            PageItems::Hits(hits) => hits.len(),
            PageItems::Records(records) => records.len(),
            PageItems::Documents(documents) => documents.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Paginator {
    result: SearchResult,
    total: u64,
    per_page: usize,
    current_page: usize,
    page_name: String,
    view: ItemView,
}

impl Paginator {
    /// Fails with `TotalHitsNotTracked` when the result carries no total.
    pub fn new(result: SearchResult, per_page: usize, current_page: usize, page_name: impl Into<String>) -> Result<Self> {
        let total = result.total().ok_or(Error::TotalHitsNotTracked)?;
        Ok(Self {
            result,
            total,
            per_page: per_page.max(1),
            current_page: current_page.max(1),
            page_name: page_name.into(),
            view: ItemView::default(),
        })
    }

    pub fn only_hits(&mut self) -> &mut Self {
        self.view = ItemView::Hits;
        self
    }

    pub fn only_records(&mut self) -> &mut Self {
        self.view = ItemView::Records;
        self
    }

    pub fn only_documents(&mut self) -> &mut Self {
        self.view = ItemView::Documents;
        self
    }

    pub fn view(&self) -> ItemView {
        self.view
    }

    /// Items of this page in the selected view.
    pub fn items(&self) -> Result<PageItems<'_>> {
        Ok(match self.view {
            ItemView::Hits => PageItems::Hits(self.result.hits()),
            ItemView::Records => PageItems::Records(self.result.records()?),
            ItemView::Documents => PageItems::Documents(self.result.documents()),
        })
    }

    pub fn result(&self) -> &SearchResult {
        &self.result
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    /// Always at least 1, even for an empty result.
    pub fn last_page(&self) -> usize {
        let pages = self.total.div_ceil(self.per_page as u64);
        usize::try_from(pages).unwrap_or(usize::MAX).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page == 1
    }

    /// 1-based number of the first item on this page.
    pub fn from(&self) -> Option<usize> {
        if self.result.hits().is_empty() {
            return None;
        }
        (self.current_page - 1).checked_mul(self.per_page)?.checked_add(1)
    }

    /// 1-based number of the last item on this page.
    pub fn to(&self) -> Option<usize> {
        self.from()?.checked_add(self.result.hits().len() - 1)
    }
}
