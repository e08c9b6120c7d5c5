//! Running a built search and the operations derived from it.
use scout_core::error::{Error, Result};
use scout_core::types::SoftDeleteMode;
use serde_json::Value;
use std::rc::Rc;
use tracing::debug;

use crate::builder::SearchBuilder;
use crate::context::Connection;
use crate::cursor::SearchCursor;
use crate::paginator::Paginator;
use crate::resolver::ModelResolver;
use crate::result::{Hit, SearchResult};

impl SearchBuilder {
    /// Send the request and wrap the response with a fresh resolver.
    pub fn execute(&self) -> Result<SearchResult> {
        let connection = self.connection()?;
        let request = self.build_request()?;
        debug!(connection = connection.name(), indices = ?request.index, "executing search");

        let response = Rc::new(connection.store().search(&request)?);
        let resolver = Rc::new(self.new_resolver(connection, response.clone()));
        Ok(SearchResult::new(response, resolver))
    }

    /// Resolver with every joined collection registered.
    ///
    /// A visibility mode other than the default also lets the record store
    /// return soft-deleted records, so trashed hits can still be hydrated.
    pub fn new_resolver(&self, connection: &Connection, response: Rc<Value>) -> ModelResolver {
        let mut resolver =
            ModelResolver::new(connection.aliases().clone(), self.ctx.records().clone(), response);
        let broadened = self.soft_delete_mode() != SoftDeleteMode::ExcludeTrashed;
        for joined in &self.joined {
            let mut options = joined.options.clone();
            options.with_trashed |= broadened;
            resolver.register_collection(joined.record_type.clone(), options);
        }
        resolver
    }

    /// Number of matching documents.
    pub fn count(&self) -> Result<u64> {
        let mut counting = self.clone();
        counting.size = Some(0);
        counting.search_after = None;
        counting.track_total_hits = Some(Value::Bool(true));
        counting
            .execute()?
            .total()
            .ok_or_else(|| Error::InvalidResponse("count response carries no total".to_string()))
    }

    pub fn first(&self) -> Result<Option<Hit>> {
        let mut single = self.clone();
        single.size = Some(1);
        Ok(single.execute()?.into_hits().into_iter().next())
    }

    pub fn first_or_fail(&self) -> Result<Hit> {
        self.first()?.ok_or_else(|| {
            let name = self.base_type().map(|t| t.name.as_str()).unwrap_or("record");
            Error::NotFound(format!("no {name} matched the search"))
        })
    }

    pub fn delete_by_query(&self) -> Result<Value> {
        let request = self.build_write_request("delete_by_query")?;
        let connection = self.connection()?;
        debug!(connection = connection.name(), indices = ?request.index, "delete by query");
        Ok(connection.store().delete_by_query(&request)?)
    }

    pub fn update_by_query(&self, script: Value) -> Result<Value> {
        let mut request = self.build_write_request("update_by_query")?;
        request.body.insert("script".to_string(), script);
        let connection = self.connection()?;
        debug!(connection = connection.name(), indices = ?request.index, "update by query");
        Ok(connection.store().update_by_query(&request)?)
    }

    /// Run one page of the search.
    ///
    /// `None` arguments fall back to the configured defaults; the page number
    /// starts at 1.
    pub fn paginate(&self, per_page: Option<usize>, page_name: Option<&str>, page: Option<usize>) -> Result<Paginator> {
        let defaults = &self.ctx.settings().paginate;
        let per_page = per_page.unwrap_or(defaults.per_page);
        if per_page == 0 {
            return Err(Error::InvalidConfig("per_page must be at least 1".to_string()));
        }
        let page_name = page_name.unwrap_or(&defaults.page_name).to_string();
        let page = page.unwrap_or(1).max(1);

        let from = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| Error::InvalidConfig(format!("page {page} is out of range at {per_page} per page")))?;

        let mut paged = self.clone();
        paged.from = Some(from);
        paged.size = Some(per_page);
        paged.track_total_hits = Some(Value::Bool(true));
        Paginator::new(paged.execute()?, per_page, page, page_name)
    }

    /// Deep-pagination cursor over every matching document.
    pub fn cursor(&self, chunk_size: Option<usize>, keep_alive: Option<&str>) -> Result<SearchCursor> {
        let defaults = &self.ctx.settings().cursor;
        let chunk_size = chunk_size.unwrap_or(defaults.chunk_size);
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("cursor chunk size must be at least 1".to_string()));
        }
        let keep_alive = keep_alive.unwrap_or(&defaults.keep_alive);
        Ok(SearchCursor::new(self.clone(), chunk_size, keep_alive))
    }
}
