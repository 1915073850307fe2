use super::{expect_args, expect_some_args, single_arg, ArgumentError, MutationEngine};
use crate::model::{add_unique, remove_all, Publication, Status};

fn optional(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn add_each(name: &str, list: &mut Vec<String>, args: &[String]) -> Result<(), ArgumentError> {
    expect_some_args(name, args)?;
    for arg in args {
        add_unique(list, arg);
    }
    Ok(())
}

fn remove_each(
    name: &str,
    list: &mut Vec<String>,
    args: &[String],
) -> Result<(), ArgumentError> {
    expect_some_args(name, args)?;
    for arg in args {
        remove_all(list, arg);
    }
    Ok(())
}

pub(crate) fn parse_status(name: &str, value: &str) -> Result<Status, ArgumentError> {
    value
        .parse::<Status>()
        .map_err(|e| ArgumentError::new(format!("{}: {}", name, e)))
}

/// The default publication mutation table
pub fn default_engine() -> MutationEngine<Publication> {
    MutationEngine::builder()
        .register("add_keyword", |p: &mut Publication, args: &[String]| {
            add_each("add_keyword", &mut p.keyword, args)
        })
        .register("remove_keyword", |p: &mut Publication, args: &[String]| {
            remove_each("remove_keyword", &mut p.keyword, args)
        })
        .register("set_title", |p: &mut Publication, args: &[String]| {
            p.title = optional(single_arg("set_title", args)?);
            Ok(())
        })
        .register("set_year", |p: &mut Publication, args: &[String]| {
            p.year = optional(single_arg("set_year", args)?);
            Ok(())
        })
        .register("set_status", |p: &mut Publication, args: &[String]| {
            p.status = parse_status("set_status", single_arg("set_status", args)?)?;
            Ok(())
        })
        .register("set_classification", |p: &mut Publication, args: &[String]| {
            p.classification = single_arg("set_classification", args)?.to_string();
            Ok(())
        })
        .register("set_doi", |p: &mut Publication, args: &[String]| {
            p.doi = optional(single_arg("set_doi", args)?);
            Ok(())
        })
        .register("set_journal_title", |p: &mut Publication, args: &[String]| {
            p.journal_title = optional(single_arg("set_journal_title", args)?);
            Ok(())
        })
        .register("add_project", |p: &mut Publication, args: &[String]| {
            add_each("add_project", &mut p.project, args)
        })
        .register("remove_project", |p: &mut Publication, args: &[String]| {
            remove_each("remove_project", &mut p.project, args)
        })
        .register("add_department", |p: &mut Publication, args: &[String]| {
            add_each("add_department", &mut p.department, args)
        })
        .register("remove_department", |p: &mut Publication, args: &[String]| {
            remove_each("remove_department", &mut p.department, args)
        })
        .register("add_reviewer_tag", |p: &mut Publication, args: &[String]| {
            add_each("add_reviewer_tag", &mut p.reviewer_tags, args)
        })
        .register("remove_reviewer_tag", |p: &mut Publication, args: &[String]| {
            remove_each("remove_reviewer_tag", &mut p.reviewer_tags, args)
        })
        .register("set_reviewer_note", |p: &mut Publication, args: &[String]| {
            p.reviewer_note = optional(single_arg("set_reviewer_note", args)?);
            Ok(())
        })
        .register("set_vabb_type", |p: &mut Publication, args: &[String]| {
            p.vabb_type = optional(single_arg("set_vabb_type", args)?);
            Ok(())
        })
        .register("set_vabb_id", |p: &mut Publication, args: &[String]| {
            p.vabb_id = optional(single_arg("set_vabb_id", args)?);
            Ok(())
        })
        .register("lock", |p: &mut Publication, args: &[String]| {
            expect_args("lock", args, 0)?;
            p.locked = true;
            Ok(())
        })
        .register("unlock", |p: &mut Publication, args: &[String]| {
            expect_args("unlock", args, 0)?;
            p.locked = false;
            Ok(())
        })
        .build()
}
