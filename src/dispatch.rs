//! Dispatcher: maps a parsed command to one store operation.
//!
//! The operation set is closed — unknown method names are a typed
//! error, not a runtime lookup. Chain modifiers on `find` apply in
//! written order, unknown chain methods are ignored, and a missing
//! `limit` gets a hard safety ceiling so console output stays bounded.
//! Write payloads pass through the validator first; a violation
//! short-circuits with no store call.

use crate::ast::{ShellCommand, StoreOperation, Value};
use crate::error::{ShellError, ShellResult};
use crate::validate;

/// Collections the console may touch.
pub const COLLECTIONS: &[&str] = &[
    "categories",
    "courses",
    "enrollments",
    "instructors",
    "payments",
    "reviews",
    "students",
];

/// Cap applied to `find` when the chain carries no explicit limit.
pub const DEFAULT_FIND_LIMIT: i64 = 50;

/// Fallbacks when a chain modifier argument is not a number.
const LIMIT_FALLBACK: i64 = 10;
const SKIP_FALLBACK: i64 = 0;

/// Turn a parsed command into the single operation it stands for.
pub fn plan(cmd: &ShellCommand) -> ShellResult<StoreOperation> {
    if !COLLECTIONS.contains(&cmd.collection.as_str()) {
        return Err(ShellError::UnknownCollection(cmd.collection.clone()));
    }

    let arg = |i: usize| cmd.args.get(i).cloned().unwrap_or_else(Value::empty_object);

    let op = match cmd.method.as_str() {
        "find" => plan_find(cmd),
        "findOne" => StoreOperation::FindOne { filter: arg(0) },
        "insertOne" => {
            let doc = cmd
                .args
                .first()
                .filter(|v| v.is_object())
                .cloned()
                .ok_or_else(|| {
                    ShellError::InvalidArguments("insertOne requires a document".to_string())
                })?;
            check_payload(&doc, &cmd.collection)?;
            StoreOperation::InsertOne { doc }
        }
        "insertMany" => {
            let Some(Value::Array(docs)) = cmd.args.first().cloned() else {
                return Err(ShellError::InvalidArguments(
                    "insertMany requires an array of documents".to_string(),
                ));
            };
            for doc in &docs {
                check_payload(doc, &cmd.collection)?;
            }
            StoreOperation::InsertMany { docs }
        }
        "updateOne" | "updateMany" => {
            let filter = arg(0);
            let update = arg(1);
            // Validate the $set sub-document when present, otherwise
            // the whole update document.
            let candidate = update.get("$set").unwrap_or(&update);
            check_payload(candidate, &cmd.collection)?;
            if cmd.method == "updateOne" {
                StoreOperation::UpdateOne { filter, update }
            } else {
                StoreOperation::UpdateMany { filter, update }
            }
        }
        "deleteOne" => StoreOperation::DeleteOne { filter: arg(0) },
        "deleteMany" => StoreOperation::DeleteMany { filter: arg(0) },
        "countDocuments" => StoreOperation::CountDocuments { filter: arg(0) },
        "aggregate" => {
            let Some(Value::Array(pipeline)) = cmd.args.first().cloned() else {
                return Err(ShellError::InvalidArguments(
                    "aggregate requires a pipeline array".to_string(),
                ));
            };
            StoreOperation::Aggregate { pipeline }
        }
        "distinct" => {
            let field = cmd
                .args
                .first()
                .and_then(Value::as_str)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| {
                    ShellError::InvalidArguments("distinct requires a field name".to_string())
                })?
                .to_string();
            StoreOperation::Distinct {
                field,
                filter: arg(1),
            }
        }
        other => return Err(ShellError::UnsupportedMethod(other.to_string())),
    };

    Ok(op)
}

fn plan_find(cmd: &ShellCommand) -> StoreOperation {
    let filter = cmd.args.first().cloned().unwrap_or_else(Value::empty_object);
    let projection = cmd.args.get(1).cloned().unwrap_or_else(Value::empty_object);

    let mut sort = None;
    let mut limit = None;
    let mut skip = None;

    for call in &cmd.chain {
        match call.method.as_str() {
            "sort" => {
                sort = Some(call.args.first().cloned().unwrap_or_else(Value::empty_object));
            }
            "limit" => {
                limit = Some(
                    call.args
                        .first()
                        .and_then(Value::as_i64)
                        .unwrap_or(LIMIT_FALLBACK),
                );
            }
            "skip" => {
                skip = Some(
                    call.args
                        .first()
                        .and_then(Value::as_i64)
                        .unwrap_or(SKIP_FALLBACK),
                );
            }
            // Anything else (.toArray(), .pretty(), typos) is ignored
            // for compatibility with loose console habits.
            _ => {}
        }
    }

    StoreOperation::Find {
        filter,
        projection,
        sort,
        limit: Some(limit.unwrap_or(DEFAULT_FIND_LIMIT)),
        skip,
    }
}

fn check_payload(doc: &Value, collection: &str) -> ShellResult<()> {
    let violations = validate::validate(doc, collection);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ShellError::Validation(violations.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_at;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn plan_line(line: &str) -> ShellResult<StoreOperation> {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        plan(&parse_at(line, now)?)
    }

    #[test]
    fn test_unknown_collection() {
        let err = plan_line("db.orders.find({})").unwrap_err();
        assert_eq!(err.to_string(), "Invalid collection: orders");
    }

    #[test]
    fn test_unsupported_method() {
        let err = plan_line("db.courses.drop()").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported method: drop");
        // Method matching is case-sensitive.
        let err = plan_line("db.courses.FIND({})").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported method: FIND");
    }

    #[test]
    fn test_find_default_limit() {
        let StoreOperation::Find { limit, sort, skip, .. } = plan_line("db.courses.find({})").unwrap()
        else {
            panic!("expected find");
        };
        assert_eq!(limit, Some(DEFAULT_FIND_LIMIT));
        assert_eq!(sort, None);
        assert_eq!(skip, None);
    }

    #[test]
    fn test_find_explicit_limit_wins() {
        let StoreOperation::Find { limit, sort, .. } =
            plan_line("db.courses.find({}).sort({rating:-1}).limit(5)").unwrap()
        else {
            panic!("expected find");
        };
        assert_eq!(limit, Some(5));
        let sort = sort.unwrap();
        assert_eq!(sort.get("rating"), Some(&Value::Number(-1.0)));
    }

    #[test]
    fn test_find_unknown_chain_methods_ignored() {
        let op = plan_line("db.courses.find({}).pretty().limit(3).explain()").unwrap();
        let StoreOperation::Find { limit, .. } = op else {
            panic!("expected find");
        };
        assert_eq!(limit, Some(3));
    }

    #[test]
    fn test_non_numeric_limit_falls_back() {
        let StoreOperation::Find { limit, .. } =
            plan_line("db.courses.find({}).limit(\"many\")").unwrap()
        else {
            panic!("expected find");
        };
        assert_eq!(limit, Some(LIMIT_FALLBACK));
    }

    #[test]
    fn test_insert_one_requires_document() {
        let err = plan_line("db.courses.insertOne()").unwrap_err();
        assert_eq!(err.to_string(), "insertOne requires a document");
    }

    #[test]
    fn test_insert_one_validation_short_circuits() {
        let err =
            plan_line(r#"db.courses.insertOne({ title: "Test", price: -10, rating: 5 })"#)
                .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Validation Error"), "got: {msg}");
        assert!(msg.contains("Price cannot be negative"));
    }

    #[test]
    fn test_insert_many_shape_and_validation() {
        let err = plan_line("db.courses.insertMany({ title: \"X\" })").unwrap_err();
        assert_eq!(err.to_string(), "insertMany requires an array of documents");

        let err = plan_line(r#"db.reviews.insertMany([{ rating: 4 }, { rating: 9 }])"#).unwrap_err();
        assert!(err.to_string().contains("Rating must be between 0 and 5"));
    }

    #[test]
    fn test_update_validates_set_subdocument() {
        let err = plan_line(r#"db.courses.updateOne({ title: "X" }, { $set: { price: -1 } })"#)
            .unwrap_err();
        assert!(err.to_string().contains("Price cannot be negative"));

        // Whole-document update payload is validated as-is.
        let err =
            plan_line(r#"db.payments.updateMany({}, { amount: -5 })"#).unwrap_err();
        assert!(err.to_string().contains("Payment amount cannot be negative"));
    }

    #[test]
    fn test_aggregate_requires_pipeline_array() {
        let err = plan_line("db.enrollments.aggregate({ $match: {} })").unwrap_err();
        assert_eq!(err.to_string(), "aggregate requires a pipeline array");

        let op = plan_line(
            r#"db.enrollments.aggregate([{ $group: { _id: "$status", count: { $sum: 1 } } }])"#,
        )
        .unwrap();
        let StoreOperation::Aggregate { pipeline } = op else {
            panic!("expected aggregate");
        };
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline[0].get("$group").is_some());
    }

    #[test]
    fn test_distinct_requires_field() {
        let err = plan_line("db.students.distinct()").unwrap_err();
        assert_eq!(err.to_string(), "distinct requires a field name");

        let op = plan_line(r#"db.students.distinct("country", { status: "active" })"#).unwrap();
        let StoreOperation::Distinct { field, filter } = op else {
            panic!("expected distinct");
        };
        assert_eq!(field, "country");
        assert_eq!(filter.get("status"), Some(&Value::String("active".into())));
    }

    #[test]
    fn test_delete_and_count() {
        assert!(matches!(
            plan_line(r#"db.students.deleteMany({ status: "inactive" })"#).unwrap(),
            StoreOperation::DeleteMany { .. }
        ));
        assert!(matches!(
            plan_line("db.courses.countDocuments({})").unwrap(),
            StoreOperation::CountDocuments { .. }
        ));
    }
}
