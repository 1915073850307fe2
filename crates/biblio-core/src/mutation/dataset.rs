use super::publication::parse_status;
use super::{expect_args, expect_some_args, single_arg, ArgumentError, MutationEngine};
use crate::model::{add_unique, remove_all, Dataset};

fn optional(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn edit_list(
    name: &str,
    list: &mut Vec<String>,
    args: &[String],
    add: bool,
) -> Result<(), ArgumentError> {
    expect_some_args(name, args)?;
    for arg in args {
        if add {
            add_unique(list, arg);
        } else {
            remove_all(list, arg);
        }
    }
    Ok(())
}

/// The default dataset mutation table
pub fn default_engine() -> MutationEngine<Dataset> {
    MutationEngine::builder()
        .register("add_keyword", |d: &mut Dataset, args: &[String]| {
            edit_list("add_keyword", &mut d.keyword, args, true)
        })
        .register("remove_keyword", |d: &mut Dataset, args: &[String]| {
            edit_list("remove_keyword", &mut d.keyword, args, false)
        })
        .register("set_title", |d: &mut Dataset, args: &[String]| {
            d.title = optional(single_arg("set_title", args)?);
            Ok(())
        })
        .register("set_year", |d: &mut Dataset, args: &[String]| {
            d.year = optional(single_arg("set_year", args)?);
            Ok(())
        })
        .register("set_status", |d: &mut Dataset, args: &[String]| {
            d.status = parse_status("set_status", single_arg("set_status", args)?)?;
            Ok(())
        })
        .register("set_doi", |d: &mut Dataset, args: &[String]| {
            d.doi = optional(single_arg("set_doi", args)?);
            Ok(())
        })
        .register("set_publisher", |d: &mut Dataset, args: &[String]| {
            d.publisher = optional(single_arg("set_publisher", args)?);
            Ok(())
        })
        .register("add_project", |d: &mut Dataset, args: &[String]| {
            edit_list("add_project", &mut d.project, args, true)
        })
        .register("remove_project", |d: &mut Dataset, args: &[String]| {
            edit_list("remove_project", &mut d.project, args, false)
        })
        .register("add_department", |d: &mut Dataset, args: &[String]| {
            edit_list("add_department", &mut d.department, args, true)
        })
        .register("remove_department", |d: &mut Dataset, args: &[String]| {
            edit_list("remove_department", &mut d.department, args, false)
        })
        .register("add_reviewer_tag", |d: &mut Dataset, args: &[String]| {
            edit_list("add_reviewer_tag", &mut d.reviewer_tags, args, true)
        })
        .register("remove_reviewer_tag", |d: &mut Dataset, args: &[String]| {
            edit_list("remove_reviewer_tag", &mut d.reviewer_tags, args, false)
        })
        .register("set_reviewer_note", |d: &mut Dataset, args: &[String]| {
            d.reviewer_note = optional(single_arg("set_reviewer_note", args)?);
            Ok(())
        })
        .register("set_license", |d: &mut Dataset, args: &[String]| {
            d.license = optional(single_arg("set_license", args)?);
            Ok(())
        })
        .register("lock", |d: &mut Dataset, args: &[String]| {
            expect_args("lock", args, 0)?;
            d.locked = true;
            Ok(())
        })
        .register("unlock", |d: &mut Dataset, args: &[String]| {
            expect_args("unlock", args, 0)?;
            d.locked = false;
            Ok(())
        })
        .build()
}
