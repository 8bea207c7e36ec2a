use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a content stream, e.g. a reader tag. Compared by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub topic: Topic,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub author: Option<String>,
}

impl Post {
    pub fn from_rss_item(topic: &Topic, item: &rss::Item) -> Self {
        let published_at = item
            .pub_date()
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|dt| dt.with_timezone(&Utc));

        // Dublin Core creator wins over the plain author field
        let author = item
            .dublin_core_ext()
            .and_then(|dc| dc.creators().first().map(|s| s.to_string()))
            .or_else(|| item.author().map(|s| s.to_string()));

        Self {
            topic: topic.clone(),
            title: item.title().unwrap_or_default().to_owned(),
            summary: item.description().map(ToOwned::to_owned),
            url: item.link().unwrap_or_default().to_owned(),
            published_at,
            guid: item.guid().map(|guid| guid.value().to_owned()),
            author,
        }
    }

    /// Stable identity used to compare two fetches of the same topic.
    pub fn identity(&self) -> String {
        match &self.guid {
            Some(guid) if !guid.is_empty() => guid.clone(),
            _ => format!("{}|{}", self.url, self.title),
        }
    }
}

/// Ordered snapshot of the posts of one topic. An empty list is a valid,
/// loaded state; "not loaded yet" is the absence of a cache entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContentList(Vec<Post>);

impl ContentList {
    pub fn new(posts: Vec<Post>) -> Self {
        Self(posts)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Post> {
        self.0.iter()
    }

    pub fn posts(&self) -> &[Post] {
        &self.0
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.0
    }
}

impl From<Vec<Post>> for ContentList {
    fn from(posts: Vec<Post>) -> Self {
        Self(posts)
    }
}

impl<'a> IntoIterator for &'a ContentList {
    type Item = &'a Post;
    type IntoIter = std::slice::Iter<'a, Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
