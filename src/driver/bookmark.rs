//! Bookmarks
//!
//! 인과적 일관성 북마크 집합. 문자열로는 쉼표로 이어 붙인다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 북마크 집합 (삽입 순서 유지, 중복 제거)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmarks {
    tokens: Vec<String>,
}

impl Bookmarks {
    /// 빈 집합
    pub fn new() -> Self {
        Self::default()
    }

    /// 단일 북마크
    pub fn single(token: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(token);
        set
    }

    /// 쉼표로 구분된 문자열에서 파싱
    pub fn parse(joined: &str) -> Self {
        joined.split(',').map(str::trim).collect()
    }

    /// 추가. 빈 문자열과 중복은 무시.
    pub fn insert(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !token.is_empty() && !self.tokens.contains(&token) {
            self.tokens.push(token);
        }
    }

    /// 합집합
    pub fn union(&self, other: &Bookmarks) -> Bookmarks {
        let mut merged = self.clone();
        for token in &other.tokens {
            merged.insert(token.clone());
        }
        merged
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.tokens.clone()
    }
}

impl fmt::Display for Bookmarks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for Bookmarks {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Bookmarks::new();
        for token in iter {
            set.insert(token);
        }
        set
    }
}

impl From<&str> for Bookmarks {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let set = Bookmarks::parse("FB:a, FB:b,,FB:a");
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "FB:a,FB:b");
        assert!(Bookmarks::parse("").is_empty());
    }

    #[test]
    fn test_union_keeps_order() {
        let a = Bookmarks::parse("x,y");
        let b = Bookmarks::parse("y,z");
        assert_eq!(a.union(&b).to_vec(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_empty_token_ignored() {
        let mut set = Bookmarks::new();
        set.insert("");
        assert!(set.is_empty());
        assert!(Bookmarks::single("bm").contains("bm"));
    }
}
