//! SASL mechanisms for [`Client::authenticate`](crate::Client::authenticate).

/// This trait allows for pluggable authentication schemes. It is used by
/// [`Client::authenticate`](crate::Client::authenticate) to answer the server's
/// challenges.
///
/// The client base64-decodes each challenge before handing it over and
/// base64-encodes the response, so implementations deal in raw bytes only.
pub trait Authenticator {
    /// The type of the response to the challenge. This will usually be a
    /// `Vec<u8>` or `String`.
    type Response: AsRef<[u8]>;

    /// Each base64-decoded server challenge is passed to `process`.
    /// The returned byte-string is base64-encoded and then sent back to the server.
    fn process(&self, challenge: &[u8]) -> Self::Response;
}

/// `PLAIN` ([RFC 4616](https://tools.ietf.org/html/rfc4616)): the whole
/// credential is sent in answer to the first (empty) challenge.
pub struct Plain<'a> {
    /// Identity to act as; usually empty.
    pub authzid: &'a str,
    /// User name.
    pub user: &'a str,
    /// Password.
    pub password: &'a str,
}

impl<'a> Plain<'a> {
    /// Credentials that authorize as the authenticating user.
    pub fn new(user: &'a str, password: &'a str) -> Self {
        Plain {
            authzid: "",
            user,
            password,
        }
    }
}

impl Authenticator for Plain<'_> {
    type Response = Vec<u8>;

    fn process(&self, _: &[u8]) -> Self::Response {
        format!("{}\0{}\0{}", self.authzid, self.user, self.password).into_bytes()
    }
}

/// `XOAUTH2`, the bearer token mechanism used by Gmail and Outlook.
///
/// After a failed attempt the server sends a JSON error as a challenge; the
/// expected reply to that is empty, after which the server completes the
/// command with `NO`.
pub struct XOAuth2<'a> {
    /// User name.
    pub user: &'a str,
    /// OAuth 2.0 access token.
    pub access_token: &'a str,
}

impl Authenticator for XOAuth2<'_> {
    type Response = Vec<u8>;

    fn process(&self, challenge: &[u8]) -> Self::Response {
        if !challenge.is_empty() {
            return Vec::new();
        }
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain() {
        let auth = Plain::new("tim", "tanstaaftanstaaf");
        assert_eq!(auth.process(b""), b"\0tim\0tanstaaftanstaaf");
    }

    #[test]
    fn xoauth2() {
        let auth = XOAuth2 {
            user: "user@example.com",
            access_token: "ya29.token123",
        };
        assert_eq!(
            auth.process(b""),
            b"user=user@example.com\x01auth=Bearer ya29.token123\x01\x01"
        );
        assert!(auth.process(b"{\"status\":\"401\"}").is_empty());
    }
}
