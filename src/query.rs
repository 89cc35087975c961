//! Listing parameters and the pagination envelope shared by every record kind.
//!
//! A raw parameter map mixes pagination keys (`limit`, `offset`, `page`) with
//! entity filters. [`ListParams::from_raw`] separates them; [`paginate`]
//! slices an already-filtered collection and computes the envelope.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::store::Filters;

// ---

pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    // ---
    pub filters: Filters,
    pub limit: usize,
    pub page: Option<usize>,
    /// Explicit offset; wins over `page` when both are given.
    pub offset: Option<usize>,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            filters: Filters::new(),
            limit: DEFAULT_LIMIT,
            page: None,
            offset: None,
        }
    }
}

fn parse_count(key: &str, raw: &str, min: usize) -> AppResult<usize> {
    // ---
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| AppError::validation(format!("{key} must be a non-negative integer, got '{raw}'")))?;
    if value < min {
        return Err(AppError::validation(format!("{key} must be at least {min}")));
    }
    Ok(value)
}

impl ListParams {
    // ---
    /// Split a raw query map into pagination settings and entity filters.
    ///
    /// Empty values are treated as absent so `?status=&limit=10` does not
    /// filter on an empty status.
    pub fn from_raw(raw: &HashMap<String, String>) -> AppResult<Self> {
        // ---
        let mut params = ListParams::default();

        for (key, value) in raw {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "limit" => params.limit = parse_count(key, value, 1)?,
                "page" => params.page = Some(parse_count(key, value, 1)?),
                "offset" => params.offset = Some(parse_count(key, value, 0)?),
                _ => {
                    params.filters.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(params)
    }

    pub fn with_filter(mut self, key: &str, value: &str) -> Self {
        self.filters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page.max(1));
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `offset` if given, else `(page - 1) * limit`, saturating so a page far
    /// past the end yields an empty slice.
    pub fn effective_offset(&self) -> usize {
        // ---
        match self.offset {
            Some(offset) => offset,
            None => self.page.unwrap_or(1).saturating_sub(1).saturating_mul(self.limit),
        }
    }

    /// Requested page, or the page containing an explicit offset.
    pub fn effective_page(&self) -> usize {
        // ---
        match (self.page, self.offset) {
            (Some(page), _) => page,
            (None, Some(offset)) => offset / self.limit + 1,
            (None, None) => 1,
        }
    }
}

/// `ceil(total / limit)`, never less than one page.
pub fn page_count(total: usize, limit: usize) -> usize {
    total.div_ceil(limit.max(1)).max(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    // ---
    pub data: Vec<T>,
    /// Matching records before slicing.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub page: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        // ---
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            page: self.page,
            pages: self.pages,
        }
    }
}

/// Slice a filtered, ordered collection according to `params`.
pub fn paginate<T>(items: Vec<T>, params: &ListParams) -> Page<T> {
    // ---
    let total = items.len();
    let limit = params.limit.max(1);
    let offset = params.effective_offset();

    let data = items.into_iter().skip(offset).take(limit).collect();

    Page {
        data,
        total,
        limit,
        offset,
        page: params.effective_page(),
        pages: page_count(total, limit),
    }
}
