/// A push endpoint: a literal URL plus optional query parameters.
///
/// Parameters with an absent value are filtered out; present values are
/// percent-encoded and joined in insertion order.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    query: Vec<(String, Option<String>)>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    /// Add a query parameter. A `None` value drops the parameter entirely.
    pub fn param<V: Into<String>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.query.push((key.into(), value.map(Into::into)));
        self
    }

    /// Render the final URL.
    pub fn build(&self) -> String {
        let pairs: Vec<String> = self
            .query
            .iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|value| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
            })
            .collect();
        if pairs.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, pairs.join("&"))
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}
