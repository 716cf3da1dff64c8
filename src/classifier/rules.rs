//! Ordered text patterns for failure classification.
//!
//! Groups are checked in order (authentication, connection, configuration,
//! server) and the first matching rule wins, so more specific rules sit
//! above the generic ones of the same group.

use std::sync::LazyLock;

use regex::Regex;

use super::ErrorKind;

pub(crate) struct Rule {
    pub kind: ErrorKind,
    pattern: Regex,
}

impl Rule {
    fn new(kind: ErrorKind, pattern: &str) -> Self {
        Self {
            kind,
            pattern: Regex::new(&format!("(?i){pattern}")).expect("built-in pattern is valid"),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

pub(crate) static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use ErrorKind::*;
    vec![
        // Authentication
        Rule::new(
            AuthRequired,
            r"authentication required|auth required|not authenticated|no credentials|login required|credentials (are )?not (linked|verified)",
        ),
        Rule::new(
            ExpiredApiKey,
            r"expired[ _-]?(api[ _-]?)?(key|token|credentials?)|(key|token|credentials?) (has |have )?expired|token_expired",
        ),
        Rule::new(
            InvalidApiKey,
            r"invalid[ _-]?(api[ _-]?)?key|incorrect api key|invalid[ _-]?(access[ _-]?)?token|bad credentials|api key (is )?(invalid|not valid)",
        ),
        Rule::new(
            WrongPassword,
            r"(wrong|incorrect|invalid) password|password (is )?incorrect|invalid username or password",
        ),
        Rule::new(
            InsufficientPermissions,
            r"insufficient (permissions?|scopes?|privileges)|forbidden|\b403\b|access denied|not authori[sz]ed to|missing (required )?scopes?",
        ),
        Rule::new(Unauthorized, r"unauthori[sz]ed|\b401\b|authentication failed"),
        // Connection
        Rule::new(
            ConnectionTimeout,
            r"timed? ?out|timeout|deadline exceeded|etimedout",
        ),
        Rule::new(
            ConnectionRefused,
            r"connection refused|econnrefused|refused to connect",
        ),
        Rule::new(
            DnsResolutionFailed,
            r"\bdns\b|enotfound|getaddrinfo|failed to lookup address|name or service not known|could not resolve host",
        ),
        Rule::new(
            NetworkError,
            r"network|connection (reset|closed|aborted)|econnreset|broken pipe|socket hang up|error sending request",
        ),
        // Configuration
        Rule::new(
            ServiceNotFound,
            r"service not found|is not registered|unknown (service|server)",
        ),
        Rule::new(
            InvalidArguments,
            r"invalid arguments?|invalid param(eter)?s?|missing required (field|param(eter)?|argument)|validation (error|failed)",
        ),
        Rule::new(
            MissingDependency,
            r"command not found|module not found|no module named|cannot find module|missing dependency|not installed|\benoent\b",
        ),
        Rule::new(
            InvalidCommand,
            r"invalid command|unknown command|unrecognized (command|option)|syntax error",
        ),
        Rule::new(
            PermissionDenied,
            r"permission denied|\beacces\b|\beperm\b|operation not permitted",
        ),
        Rule::new(
            ConfigurationError,
            r"misconfigur|configuration error|invalid config|missing (env|environment) var",
        ),
        // Server
        Rule::new(
            RateLimited,
            r"rate.?limit|too many requests|\b429\b|throttl",
        ),
        Rule::new(
            QuotaExceeded,
            r"quota|usage limit|insufficient (credits|funds|balance)|billing",
        ),
        Rule::new(
            ServerError,
            r"\b5\d\d\b|internal server error|bad gateway|service unavailable|server error",
        ),
    ]
});

/// First rule matching the text, if any.
pub(crate) fn match_text(text: &str) -> Option<ErrorKind> {
    RULES.iter().find(|rule| rule.is_match(text)).map(|rule| rule.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_compile() {
        assert!(RULES.len() > 15);
    }

    #[test]
    fn test_specific_before_generic() {
        assert_eq!(
            match_text("HTTP 401: invalid api key"),
            Some(ErrorKind::InvalidApiKey)
        );
        assert_eq!(
            match_text("HTTP 401: token has expired"),
            Some(ErrorKind::ExpiredApiKey)
        );
        assert_eq!(match_text("HTTP 401: nope"), Some(ErrorKind::Unauthorized));
        assert_eq!(
            match_text("HTTP 403: Resource not accessible"),
            Some(ErrorKind::InsufficientPermissions)
        );
    }

    #[test]
    fn test_port_numbers_do_not_look_like_statuses() {
        assert_eq!(match_text("listening on 127.0.0.1:40123"), None);
    }

    #[test]
    fn test_gateway_timeout_is_a_timeout() {
        assert_eq!(
            match_text("HTTP 504: Gateway Timeout"),
            Some(ErrorKind::ConnectionTimeout)
        );
    }
}
