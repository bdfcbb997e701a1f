use url::{Host, Url};

// Country TLDs frequently pair with one of these second-level labels;
// "shop.example.co.uk" then reduces to "example.co.uk" instead of "co.uk".
const COMMON_SECOND_LEVEL: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "org"];

/// Extracts the lowercased host of a URL. `None` for unparseable input or
/// URLs without a host (data:, about:).
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host()? {
        Host::Domain(domain) => Some(domain.to_ascii_lowercase()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

/// Reduces a host to its registrable domain.
///
/// Approximation over a small common-SLD table rather than a full public
/// suffix list; deterministic, which is what same-site comparison needs.
/// IP addresses and single-label hosts pass through unchanged.
pub fn base_domain(host: &str) -> String {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let take = if tld.len() == 2 && COMMON_SECOND_LEVEL.contains(&second) {
        3
    } else {
        2
    };
    labels[labels.len() - take..].join(".")
}

/// Same-site check between a request URL and its frame URL.
///
/// Third-party iff both hosts resolve and their registrable domains differ;
/// when either side cannot be established the request is treated as
/// first-party rather than guessed at.
pub fn is_third_party(request_url: &str, frame_url: &str) -> bool {
    match (domain_of(request_url), domain_of(frame_url)) {
        (Some(request), Some(frame)) => base_domain(&request) != base_domain(&frame),
        _ => false,
    }
}
