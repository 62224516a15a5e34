//! Paginated popup navigation

use once_cell::sync::Lazy;
use regex::Regex;

const PAGE_CLASS: &str = "popup-page";

static CLASS_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class\s*=\s*["']([^"']*)["']"#).expect("valid class attribute pattern")
});

/// One open popup: a sequence of pages, one shown at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupPager {
    page_count: usize,
    current: usize,
}

impl PopupPager {
    /// A pager over `page_count` pages (at least one), starting on the first
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count: page_count.max(1),
            current: 0,
        }
    }

    /// Count `popup-page` elements in popup markup; plain popups have one page
    pub fn from_html(html: &str) -> Self {
        let pages = CLASS_ATTR
            .captures_iter(html)
            .filter(|caps| caps[1].split_whitespace().any(|class| class == PAGE_CLASS))
            .count();
        Self::new(pages)
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Zero-based index of the visible page
    pub fn current(&self) -> usize {
        self.current
    }

    /// Move by `direction` pages; out-of-range moves change nothing
    pub fn navigate(&mut self, direction: isize) -> bool {
        let Some(target) = self.current.checked_add_signed(direction) else {
            return false;
        };
        if target >= self.page_count {
            return false;
        }
        self.current = target;
        true
    }

    pub fn next(&mut self) -> bool {
        self.navigate(1)
    }

    pub fn previous(&mut self) -> bool {
        self.navigate(-1)
    }

    /// "current / total", one-based
    pub fn indicator(&self) -> String {
        format!("{} / {}", self.current + 1, self.page_count)
    }
}
