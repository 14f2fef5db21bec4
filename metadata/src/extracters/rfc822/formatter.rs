use std::borrow::Cow;

use mail_parser::{Address, Addr, Group};

/// Formats `mail-parser` address header values as the text stored in message properties.
///
#[derive(Debug, Default)]
pub struct AddressFormatter {}

impl AddressFormatter {
    /// Formats an `Addr` into an optional `String`.
    ///
    /// Here are the formatting rules:
    /// 1. Name AND Address -> Some("Name <Address>")
    /// 2. Name -> Some("Name")
    /// 3. Address -> Some("Address")
    /// 4. Neither -> None
    ///
    pub fn format_address(&self, address: &Addr) -> Option<String> {
        let name = non_empty(&address.name);
        let address = non_empty(&address.address);
        match (name, address) {
            (Some(name), Some(address)) => Some(format!("{} <{}>", name, address)),
            (Some(name), None) => Some(name.to_string()),
            (None, Some(address)) => Some(address.to_string()),
            (None, None) => None,
        }
    }

    /// Formats each address of a header, flattening groups into their members.
    ///
    pub fn format_addresses(&self, address: &Address) -> Vec<String> {
        match address {
            Address::List(addresses) => self.format_address_list(addresses),
            Address::Group(groups) => groups
                .iter()
                .flat_map(|group| self.format_group(group))
                .collect(),
        }
    }

    /// Formats the members of a `Group`.
    ///
    pub fn format_group(&self, group: &Group) -> Vec<String> {
        self.format_address_list(&group.addresses)
    }

    fn format_address_list(&self, addresses: &[Addr]) -> Vec<String> {
        addresses
            .iter()
            .filter_map(|address| self.format_address(address))
            .collect()
    }
}

fn non_empty<'a>(value: &'a Option<Cow<'_, str>>) -> Option<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn addr<'a>(name: &'a str, address: &'a str) -> Addr<'a> {
        Addr {
            name: (!name.is_empty()).then_some(Cow::from(name)),
            address: (!address.is_empty()).then_some(Cow::from(address)),
        }
    }

    fn group<'a>(name: &'a str, addresses: Vec<Addr<'a>>) -> Group<'a> {
        Group {
            name: (!name.is_empty()).then_some(Cow::from(name)),
            addresses,
        }
    }

    #[test]
    fn test_format_address() {
        let formatter = AddressFormatter::default();
        let cases = vec![
            (addr("name", "name@domain.com"), Some("name <name@domain.com>".to_string())),
            (addr("name-only", ""), Some("name-only".to_string())),
            (addr("", "address-only"), Some("address-only".to_string())),
            (addr("  ", ""), None),
            (addr("", ""), None),
        ];

        for (addr, expected) in cases {
            assert_eq!(formatter.format_address(&addr), expected);
        }
    }

    #[test]
    fn test_format_addresses() {
        let formatter = AddressFormatter::default();
        let list = Address::List(vec![addr("name", "name@domain.com"), addr("", ""), addr("", "abc@email.com")]);
        let groups = Address::Group(vec![
            group("team", vec![addr("name", "name@domain.com"), addr("name2", "name2@email.com")]),
            group("empty", vec![]),
        ]);

        assert_eq!(
            formatter.format_addresses(&list),
            vec!["name <name@domain.com>".to_string(), "abc@email.com".to_string()]
        );
        assert_eq!(
            formatter.format_addresses(&groups),
            vec!["name <name@domain.com>".to_string(), "name2 <name2@email.com>".to_string()]
        );
    }
}
