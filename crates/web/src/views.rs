use askama::Template;
use pawoo_home_mastodon::Status;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub instance: &'a str,
    pub signed_in: bool,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate<'a> {
    pub statuses: &'a [StatusView],
}

/// A timeline entry flattened for display. Empty strings mean "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub author: String,
    pub acct: String,
    pub text: String,
    pub posted_at: String,
    pub url: String,
    pub boosted_by: String,
}

impl From<Status> for StatusView {
    fn from(status: Status) -> Self {
        let boosted_by = match (&status.reblog, &status.account) {
            (Some(_), Some(account)) => account.display_name(),
            _ => String::new(),
        };
        let shown = match status.reblog {
            Some(inner) => *inner,
            None => status,
        };

        let (author, acct) = shown
            .account
            .as_ref()
            .map(|a| (a.display_name(), a.acct.clone()))
            .unwrap_or_default();
        let url = shown
            .url
            .clone()
            .filter(|u| u.starts_with("https://") || u.starts_with("http://"))
            .unwrap_or_default();

        Self {
            author,
            acct,
            text: shown.plain_text(),
            posted_at: shown
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default(),
            url,
            boosted_by,
        }
    }
}
