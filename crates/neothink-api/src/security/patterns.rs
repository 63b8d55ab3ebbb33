//! Suspicious request detection.
//!
//! The percent-decoded `path?query` is matched against three regex families.
//! Decoding is applied twice so `%253C` is caught as `<`.

use regex::{Regex, RegexSet};

/// Which family matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    SqlInjection,
    Xss,
    PathTraversal,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::SqlInjection => "sql_injection",
            PatternKind::Xss => "xss",
            PatternKind::PathTraversal => "path_traversal",
        }
    }
}

const SQL_INJECTION: &[&str] = &[
    r"(?i)\bunion\b[\s+]+(all[\s+]+)?select\b",
    // `select ... from` alone is ordinary English; require a quote or `;`.
    r#"(?i)['";].*\bselect\b[\s+].*\bfrom\b|\bselect\b[\s+].*\bfrom\b.*['";]"#,
    r"(?i)\b(insert[\s+]+into|delete[\s+]+from|drop[\s+]+(table|database)|truncate[\s+]+table)\b",
    r"(?i)\bupdate\b[\s+]+\w+[\s+]+set\b",
    r"(?i)'[\s+]*(or|and)[\s+]+'?\d*'?[\s+]*=",
    r"(?i)\b(or|and)[\s+]+\d+[\s+]*=[\s+]*\d+",
    // Comment markers count only right after a quote or digit, as in `1--`.
    r"(?i)['\d][\s+]*(--|#|/\*)([\s+]|$)",
    r"(?i)\b(exec|execute)[\s+]*(\(|xp_)",
    r"(?i)\b(sleep|benchmark|pg_sleep)[\s+]*\(",
    r"(?i);[\s+]*(drop|delete|update|insert|shutdown)\b",
];

const XSS: &[&str] = &[
    r"(?i)<[\s/]*script\b",
    r"(?i)javascript[\s]*:",
    r"(?i)vbscript[\s]*:",
    r"(?i)\bon(load|error|click|mouseover|focus|blur|submit|change)[\s+]*=",
    r"(?i)<[\s]*(iframe|object|embed|svg|img)\b",
    r"(?i)\b(document\.cookie|document\.write|window\.location)\b",
    r"(?i)\beval[\s+]*\(",
    r"(?i)data:text/html",
];

const PATH_TRAVERSAL: &[&str] = &[
    r"\.\./",
    r"\.\.\\",
    r"(?i)/etc/(passwd|shadow|hosts)",
    r"(?i)[a-z]:\\windows\\",
    r"(?i)\\\\.*\\(system32|windows)",
    r"\x00",
];

/// Compiled pattern families.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    families: Vec<(PatternKind, RegexSet)>,
}

/// Percent-decode until stable (at most twice); `+` counts as a space.
fn decode(input: &str) -> String {
    let mut current = input.replace('+', " ");
    for _ in 0..2 {
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded != current => current = decoded.into_owned(),
            _ => break,
        }
    }
    current
}

impl PatternDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            families: vec![
                (PatternKind::SqlInjection, RegexSet::new(SQL_INJECTION)?),
                (PatternKind::Xss, RegexSet::new(XSS)?),
                (PatternKind::PathTraversal, RegexSet::new(PATH_TRAVERSAL)?),
            ],
        })
    }

    /// Add an extra pattern to a family.
    pub fn with_pattern(mut self, kind: PatternKind, pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern)?;
        if let Some((_, set)) = self.families.iter_mut().find(|(k, _)| *k == kind) {
            let mut patterns: Vec<String> = set.patterns().to_vec();
            patterns.push(pattern.to_string());
            *set = RegexSet::new(&patterns)?;
        }
        Ok(self)
    }

    /// First matching family for a request target, if any.
    pub fn detect(&self, path: &str, query: Option<&str>) -> Option<PatternKind> {
        let target = match query {
            Some(q) if !q.is_empty() => format!("{}?{}", path, q),
            _ => path.to_string(),
        };
        let decoded = decode(&target);
        self.families
            .iter()
            .find(|(_, set)| set.is_match(&decoded) || set.is_match(&target))
            .map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> PatternDetector {
        PatternDetector::new().unwrap()
    }

    #[test]
    fn test_sql_injection() {
        let d = detector();
        assert_eq!(
            d.detect("/api/users", Some("id=1%20UNION%20SELECT%20password%20FROM%20users")),
            Some(PatternKind::SqlInjection)
        );
        assert_eq!(
            d.detect("/api/users", Some("name=admin'%20OR%20'1'='1")),
            Some(PatternKind::SqlInjection)
        );
        assert_eq!(
            d.detect("/api/items", Some("q=1;DROP%20TABLE%20items")),
            Some(PatternKind::SqlInjection)
        );
        for query in [
            "name=admin'--",
            "id=1--",
            "id=7%20%23%20x",
            "q=x'%20and%20(select%20pw%20from%20users)",
            "q=1;%20select%20*%20from%20users",
        ] {
            assert_eq!(
                d.detect("/api/users", Some(query)),
                Some(PatternKind::SqlInjection),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_xss() {
        let d = detector();
        assert_eq!(
            d.detect("/search", Some("q=%3Cscript%3Ealert(1)%3C/script%3E")),
            Some(PatternKind::Xss)
        );
        assert_eq!(
            d.detect("/search", Some("q=%253Cscript%253E")),
            Some(PatternKind::Xss)
        );
        assert_eq!(
            d.detect("/go", Some("next=javascript:alert(1)")),
            Some(PatternKind::Xss)
        );
        assert_eq!(
            d.detect("/p", Some("x=<img%20src=x%20onerror=alert(1)>")),
            Some(PatternKind::Xss)
        );
    }

    #[test]
    fn test_path_traversal() {
        let d = detector();
        assert_eq!(
            d.detect("/static/../../etc/passwd", None),
            Some(PatternKind::PathTraversal)
        );
        assert_eq!(
            d.detect("/files", Some("p=%2e%2e%2f%2e%2e%2fsecret")),
            Some(PatternKind::PathTraversal)
        );
    }

    #[test]
    fn test_benign_requests_pass() {
        let d = detector();
        for (path, query) in [
            ("/api/chat/general/messages", Some("limit=50")),
            ("/api/feedback", None),
            ("/api/auth/sign-in", None),
            ("/", Some("utm_source=newsletter&utm_medium=email")),
            ("/api/bridge/preferences", Some("select=theme")),
            ("/blog/selecting-the-right-plan", None),
            ("/api/search", Some("q=update%20my%20profile%20settings")),
            ("/api/chat/general/messages", Some("q=C%23")),
            ("/api/chat/general/messages", Some("tag=%23")),
            ("/api/feedback", Some("title=well--")),
            ("/api/search", Some("q=select%20a%20plan%20from%20the%20list")),
            ("/api/search", Some("q=select+a+plan+from+the+list")),
            ("/api/search", Some("q=item%205%20%231")),
        ] {
            assert_eq!(d.detect(path, query), None, "{} {:?}", path, query);
        }
    }

    #[test]
    fn test_custom_pattern() {
        let d = detector()
            .with_pattern(PatternKind::PathTraversal, r"(?i)\.git/")
            .unwrap();
        assert_eq!(d.detect("/.git/config", None), Some(PatternKind::PathTraversal));
        assert!(detector().with_pattern(PatternKind::Xss, "(").is_err());
    }
}
