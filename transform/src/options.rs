use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::{TransformOption, TransformOptionGroup};

/// The options of a transform request, by name.
pub type TransformOptions = BTreeMap<String, String>;

/// Option giving the request timeout in milliseconds. Every transformer accepts it.
pub const OPTION_TIMEOUT: &str = "timeout";

/// Add the options of a group that apply to a request.
///
/// A group is required only when it and its parent are. The options of a group, including those of its qualifying
/// sub-groups, apply when the group is required or when any of them is present in the request. Each option keeps
/// its own required flag.
///
/// # Arguments
///
/// * `possible` - Option names mapped to whether they are required, added to.
/// * `group` - The group.
/// * `parent_required` - Whether the enclosing group is required.
/// * `actual` - The options of the request.
///
pub fn add_to_possible_transform_options(
    possible: &mut HashMap<String, bool>,
    group: &TransformOptionGroup,
    parent_required: bool,
    actual: &TransformOptions,
) {
    let required = group.required && parent_required;
    let mut group_options = HashMap::new();

    for option in &group.transform_options {
        match option {
            TransformOption::Group(sub_group) => {
                add_to_possible_transform_options(&mut group_options, sub_group, required, actual)
            }
            TransformOption::Value(value) => {
                group_options.insert(value.name.clone(), value.required);
            }
        }
    }

    if required || group_options.keys().any(|name| actual.contains_key(name)) {
        possible.extend(group_options);
    }
}

/// Whether the options of a request suit the possible options.
///
/// Every required option must be present, and every option present must be possible. [`OPTION_TIMEOUT`] is always
/// possible.
///
pub fn options_supported(possible: &HashMap<String, bool>, actual: &TransformOptions) -> bool {
    let required_present = possible
        .iter()
        .filter(|(_, required)| **required)
        .all(|(name, _)| actual.contains_key(name));
    let all_known = actual
        .keys()
        .all(|name| name == OPTION_TIMEOUT || possible.contains_key(name));
    required_present && all_known
}

/// Whether a transformer accepting `options` can handle the request options.
///
pub fn group_supports(options: &TransformOptionGroup, actual: &TransformOptions) -> bool {
    let mut possible = HashMap::new();
    add_to_possible_transform_options(&mut possible, options, true, actual);
    options_supported(&possible, actual)
}

/// The request options a transformer declares; it passes on no others.
///
/// [`OPTION_TIMEOUT`] is always kept, so the steps of a pipeline or failover are held to the request timeout.
///
pub fn strip_options(actual: &TransformOptions, declared: &HashSet<String>) -> TransformOptions {
    actual
        .iter()
        .filter(|(name, _)| *name == OPTION_TIMEOUT || declared.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::TransformOptionValue;

    use super::*;

    fn value(name: &str, required: bool) -> TransformOption {
        TransformOption::Value(TransformOptionValue {
            name: name.to_string(),
            required,
        })
    }

    fn options(names: &[&str]) -> TransformOptions {
        names.iter().map(|name| (name.to_string(), "1".to_string())).collect()
    }

    fn image_options() -> TransformOptionGroup {
        TransformOptionGroup::new(
            true,
            vec![
                value("resolution", false),
                TransformOption::Group(TransformOptionGroup::new(
                    false,
                    vec![value("width", true), value("height", true)],
                )),
            ],
        )
    }

    #[test]
    fn test_add_to_possible_transform_options() {
        let mut without_size = HashMap::new();
        let mut with_size = HashMap::new();

        add_to_possible_transform_options(&mut without_size, &image_options(), true, &options(&[]));
        add_to_possible_transform_options(&mut with_size, &image_options(), true, &options(&["width"]));

        assert_eq!(without_size, HashMap::from([("resolution".to_string(), false)]));
        assert_eq!(
            with_size,
            HashMap::from([
                ("resolution".to_string(), false),
                ("width".to_string(), true),
                ("height".to_string(), true),
            ])
        );
    }

    #[test]
    fn test_group_supports() {
        let group = image_options();

        assert!(group_supports(&group, &options(&[])));
        assert!(group_supports(&group, &options(&["resolution", "timeout"])));
        assert!(group_supports(&group, &options(&["width", "height"])));
        assert!(!group_supports(&group, &options(&["width"])));
        assert!(!group_supports(&group, &options(&["unknown"])));
    }

    #[test]
    fn test_optional_group_not_required_by_parent() {
        let group = TransformOptionGroup::new(false, vec![value("pageLimit", true)]);

        assert!(group_supports(&group, &options(&[])));
        assert!(group_supports(&group, &options(&["pageLimit"])));
    }

    #[test]
    fn test_strip_options() {
        let declared = HashSet::from(["resolution".to_string()]);

        assert_eq!(strip_options(&options(&["resolution", "width"]), &declared), options(&["resolution"]));
        assert_eq!(strip_options(&options(&["timeout", "width"]), &declared), options(&["timeout"]));
    }
}
