//! phpBB markup extraction
//!
//! This module turns fetched forum and topic pages into structured listings:
//! - Forum pages: title, ordered entries (groups, inline forums, forum/topic links,
//!   external links) and the next-page link
//! - Topic pages: posts in display order and the next-page link
//!
//! The crawler only sees the [`PageParser`] trait; [`PhpBbParser`] is the concrete
//! implementation for prosilver-style markup.

use crate::record::{Key, Post};
use crate::{ArchiverError, Result};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// One parsed page of a forum listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPage {
    pub title: String,

    /// Entries in display order
    pub entries: Vec<ForumEntry>,

    /// Absolute URL of the following page, if any
    pub next_page: Option<String>,
}

/// An entry of a forum listing, before any of its links are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumEntry {
    /// A block header that itself links to a forum
    InlineForum { title: String, url: String, key: Key },

    /// A plain block header
    Group { title: String },

    /// A row linking to a sub-forum
    Forum {
        title: String,
        description: String,
        url: String,
        key: Key,
    },

    /// A row linking to a topic, with its first poster
    Topic {
        title: String,
        url: String,
        key: Key,
        user_id: i64,
        user_name: String,
        datetime: String,
    },

    /// A row linking off-site
    External {
        title: String,
        description: String,
        url: String,
    },
}

/// One parsed page of a topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPage {
    pub posts: Vec<Post>,
    pub next_page: Option<String>,
}

/// Extracts listings from fetched page content
pub trait PageParser: Send + Sync {
    fn parse_forum_page(&self, html: &str) -> Result<ForumPage>;
    fn parse_topic_page(&self, html: &str) -> Result<TopicPage>;
}

/// Group headers that only summarize other listings
const SKIPPED_GROUPS: &[&str] = &["Active topics"];

/// Parser for phpBB prosilver markup
///
/// Relative links are resolved against the board's base URL.
#[derive(Debug, Clone)]
pub struct PhpBbParser {
    base: Url,
}

impl PhpBbParser {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn resolve(&self, href: &str) -> Result<Url> {
        Ok(self.base.join(href)?)
    }

    fn next_page(&self, document: &Html) -> Result<Option<String>> {
        let next = selector("li.arrow.next a[href]")?;
        document
            .select(&next)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| self.resolve(href).map(String::from))
            .transpose()
    }

    /// Parses one `li.row` of a listing
    fn parse_row(&self, row: ElementRef<'_>) -> Result<ForumEntry> {
        let link_sel = selector("a[href]")?;
        let link = row
            .select(&link_sel)
            .next()
            .ok_or_else(|| ArchiverError::parse("listing row", "row without a link"))?;
        let href = link.value().attr("href").unwrap_or_default();
        let title = text_of(link);

        if href.starts_with("./viewforum.php") {
            let url = self.resolve(href)?;
            let forum = query_id(&url, "f").ok_or_else(|| missing_param(&title, "f"))?;
            Ok(ForumEntry::Forum {
                title,
                description: row_description(row)?,
                url: url.into(),
                key: Key::forum(forum),
            })
        } else if href.starts_with("./viewtopic.php") {
            let url = self.resolve(href)?;
            let forum = query_id(&url, "f").ok_or_else(|| missing_param(&title, "f"))?;
            let topic = query_id(&url, "t").ok_or_else(|| missing_param(&title, "t"))?;

            let poster_sel = selector("div.topic-poster")?;
            let poster = row.select(&poster_sel).next().ok_or_else(|| {
                ArchiverError::parse(title.clone(), "topic row without a poster")
            })?;
            let (user_id, user_name, datetime) = author_of(poster, &title)?;

            Ok(ForumEntry::Topic {
                title,
                url: url.into(),
                key: Key::topic(forum, topic),
                user_id,
                user_name,
                datetime,
            })
        } else if href.starts_with("https://") {
            Ok(ForumEntry::External {
                title,
                description: row_description(row)?,
                url: href.to_string(),
            })
        } else {
            Err(ArchiverError::parse(
                title,
                format!("unrecognized link target {}", href),
            ))
        }
    }

    fn parse_post(&self, post: ElementRef<'_>) -> Result<Post> {
        let title_sel = selector("h3 a")?;
        let title = post
            .select(&title_sel)
            .next()
            .map(text_of)
            .ok_or_else(|| ArchiverError::parse("topic page", "post without a title"))?;

        let author_sel = selector("p.author")?;
        let author = post
            .select(&author_sel)
            .next()
            .ok_or_else(|| ArchiverError::parse(title.clone(), "post without an author line"))?;
        let (user_id, user_name, datetime) = author_of(author, &title)?;

        let id_sel = selector(r#"div[id^="post_content"]"#)?;
        let post_id = post
            .select(&id_sel)
            .next()
            .and_then(|div| div.value().id())
            .and_then(|id| id.strip_prefix("post_content"))
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| ArchiverError::parse(title.clone(), "post without a numeric id"))?;

        let content_sel = selector("div.content")?;
        let content = post
            .select(&content_sel)
            .next()
            .map(|div| div.inner_html())
            .ok_or_else(|| ArchiverError::parse(title.clone(), "post without content"))?;

        Ok(Post {
            title,
            user_id,
            user_name,
            datetime,
            post_id,
            content,
        })
    }
}

impl PageParser for PhpBbParser {
    /// Parses a forum listing page
    ///
    /// Blocks are walked in document order. A block header that links to a forum
    /// becomes an inline forum and its rows are skipped, since that forum is
    /// archived under its own key. Rows of skipped groups and rows outside any
    /// block are ignored.
    fn parse_forum_page(&self, html: &str) -> Result<ForumPage> {
        let document = Html::parse_document(html);

        let title_sel = selector("h2.forum-title")?;
        let h1_sel = selector("h1")?;
        let title = document
            .select(&title_sel)
            .next()
            .or_else(|| document.select(&h1_sel).next())
            .map(text_of)
            .ok_or_else(|| ArchiverError::parse("forum page", "no forum title"))?;

        let walk = selector("ul.topiclist li.header div.list-inner, ul.topiclist li.row")?;
        let link_sel = selector("a[href]")?;
        let mut entries = Vec::new();
        let mut collecting = false;

        for element in document.select(&walk) {
            if element.value().name() == "li" {
                if collecting {
                    entries.push(self.parse_row(element)?);
                }
                continue;
            }

            if let Some(link) = element.select(&link_sel).next() {
                let title = text_of(link);
                let url = self.resolve(link.value().attr("href").unwrap_or_default())?;
                let forum = query_id(&url, "f").ok_or_else(|| missing_param(&title, "f"))?;
                entries.push(ForumEntry::InlineForum {
                    title,
                    url: url.into(),
                    key: Key::forum(forum),
                });
                collecting = false;
                continue;
            }

            let title = text_of(element);
            collecting = !SKIPPED_GROUPS.contains(&title.as_str());
            if collecting {
                entries.push(ForumEntry::Group { title });
            }
        }

        Ok(ForumPage {
            title,
            entries,
            next_page: self.next_page(&document)?,
        })
    }

    fn parse_topic_page(&self, html: &str) -> Result<TopicPage> {
        let document = Html::parse_document(html);
        let post_sel = selector("div.post")?;

        let posts = document
            .select(&post_sel)
            .map(|post| self.parse_post(post))
            .collect::<Result<Vec<_>>>()?;

        Ok(TopicPage {
            posts,
            next_page: self.next_page(&document)?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ArchiverError::parse("selector", format!("{}: {:?}", css, e)))
}

fn missing_param(context: &str, param: &str) -> ArchiverError {
    ArchiverError::parse(context, format!("link without a numeric {}= parameter", param))
}

/// Whitespace-trimmed text content of an element
fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Numeric value of query parameter `name`
fn query_id(url: &Url, name: &str) -> Option<u64> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
}

/// Text between the first `<br>` of a row and the next line break or block
///
/// Moderator lists and responsive duplicates are not descriptions.
fn row_description(row: ElementRef<'_>) -> Result<String> {
    let br_sel = selector("br")?;
    let Some(br) = row.select(&br_sel).next() else {
        return Ok(String::new());
    };

    let mut description = String::new();
    for sibling in br.next_siblings() {
        match sibling.value() {
            Node::Text(text) => description.push_str(text),
            Node::Element(element) => {
                if matches!(element.name(), "br" | "div") {
                    break;
                }
                let Some(child) = ElementRef::wrap(sibling) else {
                    continue;
                };
                let child_text = child.text().collect::<String>();
                if description.trim().is_empty()
                    && element.name() == "strong"
                    && child_text.trim_start().starts_with("Moderators:")
                {
                    return Ok(String::new());
                }
                description.push_str(&child_text);
            }
            _ => {}
        }
    }

    Ok(description.trim().to_string())
}

/// User id, name and timestamp from a poster block
///
/// Guests have no profile link and get id -1.
fn author_of(block: ElementRef<'_>, context: &str) -> Result<(i64, String, String)> {
    let profile_sel = selector(r#"a[href*="mode=viewprofile"]"#)?;
    let user_id = match block
        .select(&profile_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
    {
        Some(href) => profile_user_id(href)
            .ok_or_else(|| ArchiverError::parse(context, "profile link without a u= id"))?,
        None => -1,
    };

    let name_sel = selector(".username, .username-coloured")?;
    let user_name = block
        .select(&name_sel)
        .next()
        .map(text_of)
        .ok_or_else(|| ArchiverError::parse(context, "poster without a user name"))?;

    let time_sel = selector("time[datetime]")?;
    let datetime = block
        .select(&time_sel)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .map(String::from)
        .ok_or_else(|| ArchiverError::parse(context, "poster without a timestamp"))?;

    Ok((user_id, user_name, datetime))
}

fn profile_user_id(href: &str) -> Option<i64> {
    let query = href.split_once('?').map(|(_, q)| q)?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "u")
        .and_then(|(_, value)| value.parse().ok())
}
