//! Pure helpers: Link header discovery and URL scheme policy (no HTTP).

use url::{Host, Url};

/// Link relation pointing from a payment method URL to its manifest.
pub(crate) const PAYMENT_METHOD_MANIFEST_REL: &str = "payment-method-manifest";

/// Whether a manifest may be fetched from `url`.
///
/// `https` always; `http` only for loopback hosts and only when allowed.
pub(crate) fn is_allowed_manifest_url(url: &Url, allow_loopback_http: bool) -> bool {
    match url.scheme() {
        "https" => true,
        "http" if allow_loopback_http => match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => false,
    }
}

/// Find the payment method manifest location in `Link` header values.
///
/// Relative targets resolve against `base`. The first matching link wins.
pub(crate) fn find_manifest_link<'a, I>(values: I, base: &Url) -> Option<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .find_map(|link| parse_link(link.trim(), base))
}

fn parse_link(link: &str, base: &Url) -> Option<Url> {
    let rest = link.strip_prefix('<')?;
    let (target, params) = rest.split_once('>')?;

    let is_manifest = params.split(';').any(|param| {
        let Some((name, value)) = param.trim().split_once('=') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("rel")
            && value
                .trim()
                .trim_matches('"')
                .split_whitespace()
                .any(|rel| rel.eq_ignore_ascii_case(PAYMENT_METHOD_MANIFEST_REL))
    });

    if !is_manifest {
        return None;
    }
    base.join(target.trim()).ok()
}
