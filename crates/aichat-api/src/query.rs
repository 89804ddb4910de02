//! Query parameters in the bracketed form the backend expects
//! (`filters[user][documentId][$eq]=…`).
//!
//! Encoding is left to reqwest's form serializer, which keeps `*` literal
//! as `populate=*` requires.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// `populate=*`: expand every relation one level deep.
    pub fn populate_all(self) -> Self {
        self.param("populate", "*")
    }

    /// `filters[<path>...][$eq]=value`
    pub fn filter_eq(self, path: &[&str], value: impl ToString) -> Self {
        let mut key = String::from("filters");
        for segment in path {
            key.push('[');
            key.push_str(segment);
            key.push(']');
        }
        key.push_str("[$eq]");
        self.param(&key, value)
    }

    pub fn page(self, page: u32, page_size: u32) -> Self {
        self.param("pagination[page]", page)
            .param("pagination[pageSize]", page_size)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}
