use super::*;
use axum::http::HeaderMap;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().unwrap());
    headers
}

mod extract_bearer_token_tests {
    use super::*;

    #[test]
    fn valid_bearer_token() {
        let result = extract_bearer_token(&headers_with("Bearer sess-8f2c1e"));
        assert_eq!(result, Ok("sess-8f2c1e".to_string()));
    }

    #[test]
    fn valid_bearer_token_with_extra_whitespace() {
        let result = extract_bearer_token(&headers_with("Bearer   sess-8f2c1e  "));
        assert_eq!(result, Ok("sess-8f2c1e".to_string()));
    }

    #[test]
    fn case_insensitive_bearer() {
        let result = extract_bearer_token(&headers_with("bearer sess-8f2c1e"));
        assert_eq!(result, Ok("sess-8f2c1e".to_string()));
    }

    #[test]
    fn missing_authorization_header() {
        let result = extract_bearer_token(&HeaderMap::new());
        assert_eq!(result, Err(TokenError::Missing));
    }

    #[test]
    fn missing_bearer_prefix() {
        let result = extract_bearer_token(&headers_with("sess-8f2c1e"));
        assert_eq!(result, Err(TokenError::InvalidFormat));
    }

    #[test]
    fn wrong_scheme() {
        let result = extract_bearer_token(&headers_with("Basic dXNlcjpwYXNz"));
        assert_eq!(result, Err(TokenError::InvalidFormat));
    }

    #[test]
    fn empty_token() {
        let result = extract_bearer_token(&headers_with("Bearer    "));
        assert_eq!(result, Err(TokenError::Empty));
    }
}

mod bearer_sessions_tests {
    use super::*;

    fn sessions() -> BearerSessions {
        BearerSessions::new([("tok-alice", "owner-alice"), ("tok-bob", "owner-bob")])
    }

    #[test]
    fn resolves_known_token() {
        let owner = sessions().resolve(&headers_with("Bearer tok-bob"));
        assert_eq!(owner.as_deref(), Some("owner-bob"));
    }

    #[test]
    fn unknown_token_is_unauthenticated() {
        assert_eq!(sessions().resolve(&headers_with("Bearer tok-mallory")), None);
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        assert_eq!(sessions().resolve(&HeaderMap::new()), None);
    }

    #[test]
    fn from_config_entries() {
        let config = vec![SessionConfig {
            token: "t1".to_string(),
            owner: "o1".to_string(),
        }];
        let sessions = BearerSessions::from_config(&config);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.resolve(&headers_with("Bearer t1")).as_deref(), Some("o1"));
    }
}
