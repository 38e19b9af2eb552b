use rand::{distributions::Alphanumeric, Rng};
use tower_cookies::{Cookie, Cookies};

const CSRF_COOKIE_NAME: &str = "_csrf";
const TOKEN_LEN: usize = 32;

/// Generates a fresh token, stores it in the session cookie and returns it
/// so the form can embed it as a hidden field.
pub fn issue_csrf_token(cookies: &Cookies) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();

    let mut cookie = Cookie::new(CSRF_COOKIE_NAME, token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    token
}

/// A submission is valid only when the hidden field matches the cookie.
/// A matching token is consumed: the cookie is cleared so it cannot be
/// replayed on a later submit.
pub fn verify_csrf_token(cookies: &Cookies, submitted: &str) -> bool {
    if submitted.is_empty() {
        return false;
    }
    let valid = cookies
        .get(CSRF_COOKIE_NAME)
        .map(|cookie| cookie.value() == submitted)
        .unwrap_or(false);

    if valid {
        let mut removal = Cookie::new(CSRF_COOKIE_NAME, "");
        removal.set_path("/");
        cookies.remove(removal);
    }

    valid
}
