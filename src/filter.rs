//! construction of search filters from untrusted values

use ldap3::ldap_escape;

/// `(attr=value)` with the value escaped
pub fn equality(attr: &str, value: &str) -> String {
    format!("({}={})", attr, ldap_escape(value))
}

/// `(attr=value)` with the value escaped, or `(attr=*)` if there is no value
pub fn equality_or_any(attr: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => equality(attr, v),
        None => format!("({}=*)", attr),
    }
}

/// conjunction of the given filter components
pub fn and<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = String::from("(&");
    for p in parts {
        result.push_str(p.as_ref());
    }
    result.push(')');
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_escaped() {
        assert_eq!(equality("sAMAccountName", "alice"), "(sAMAccountName=alice)");
        assert_eq!(
            equality("sn", "*)(objectClass=*"),
            "(sn=\\2a\\29\\28objectClass=\\2a)"
        );
        assert_eq!(
            equality("distinguishedName", "CN=Doe\\, John,OU=Users"),
            "(distinguishedName=CN=Doe\\5c, John,OU=Users)"
        );
    }

    #[test]
    fn missing_values_match_anything() {
        assert_eq!(
            and([
                equality_or_any("sn", Some("Smith")),
                equality_or_any("givenName", None),
                equality_or_any("description", Some("PS")),
            ]),
            "(&(sn=Smith)(givenName=*)(description=PS))"
        );
    }
}
