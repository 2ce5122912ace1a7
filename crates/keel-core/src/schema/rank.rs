use crate::error::SchemaError;
use crate::schema::field::Field;
use std::collections::HashMap;

#[derive(Clone, Copy, Eq, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

///
/// rank_fields
///
/// Assigns every field a 1-based conversion rank and fills the forward
/// `dependents` lists. Declaration order seeds the walk: dependency-free
/// declared fields first, then a depth-first descent over the remaining
/// declared fields, then opaque fields last. Returns the ordinals in rank
/// order.
///

pub(crate) fn rank_fields(
    schema: &str,
    fields: &mut [Field],
    ordinals: &HashMap<String, usize>,
) -> Result<Vec<usize>, SchemaError> {
    let mut depends: Vec<Vec<usize>> = vec![Vec::new(); fields.len()];

    for (ordinal, field) in fields.iter().enumerate() {
        for name in &field.depends {
            let Some(&target) = ordinals.get(name) else {
                return Err(SchemaError::UnknownDependency {
                    schema: schema.to_string(),
                    field: field.name.clone(),
                    depends: name.clone(),
                });
            };
            if fields[target].is_opaque() {
                return Err(SchemaError::OpaqueDependency {
                    schema: schema.to_string(),
                    field: field.name.clone(),
                    target: name.clone(),
                });
            }
            depends[ordinal].push(target);
        }
    }

    for (ordinal, targets) in depends.iter().enumerate() {
        for &target in targets {
            fields[target].dependents.push(ordinal);
        }
    }

    let mut marks = vec![Mark::Unvisited; fields.len()];
    let mut ranked = Vec::with_capacity(fields.len());

    for ordinal in 0..fields.len() {
        if fields[ordinal].depends.is_empty() && !fields[ordinal].is_opaque() {
            topo_add(schema, fields, &depends, &mut marks, &mut ranked, ordinal)?;
        }
    }
    for ordinal in 0..fields.len() {
        if marks[ordinal] == Mark::Unvisited && !fields[ordinal].is_opaque() {
            topo_add(schema, fields, &depends, &mut marks, &mut ranked, ordinal)?;
        }
    }
    for ordinal in 0..fields.len() {
        if fields[ordinal].is_opaque() {
            fields[ordinal].rank = ranked.len() + 1;
            ranked.push(ordinal);
        }
    }

    Ok(ranked)
}

fn topo_add(
    schema: &str,
    fields: &mut [Field],
    depends: &[Vec<usize>],
    marks: &mut [Mark],
    ranked: &mut Vec<usize>,
    ordinal: usize,
) -> Result<(), SchemaError> {
    match marks[ordinal] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            return Err(SchemaError::CircularDependency {
                schema: schema.to_string(),
                path: cycle_path(fields, marks, ordinal),
            });
        }
        Mark::Unvisited => {}
    }

    marks[ordinal] = Mark::InProgress;
    for &target in &depends[ordinal] {
        topo_add(schema, fields, depends, marks, ranked, target)?;
    }
    marks[ordinal] = Mark::Done;

    fields[ordinal].rank = ranked.len() + 1;
    ranked.push(ordinal);
    Ok(())
}

/// Names of the fields still in progress, ending back at the offender.
fn cycle_path(fields: &[Field], marks: &[Mark], offender: usize) -> String {
    let mut names: Vec<&str> = marks
        .iter()
        .zip(fields.iter())
        .filter(|(mark, _)| **mark == Mark::InProgress)
        .map(|(_, field)| field.name.as_str())
        .collect();
    names.push(fields[offender].name.as_str());
    names.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldType;
    use crate::value::Value;

    fn ordinals(fields: &[Field]) -> HashMap<String, usize> {
        fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect()
    }

    fn computed(name: &str, depends: &[&str]) -> Field {
        Field::new(name, FieldType::Auto)
            .convert(|raw, _| raw.cloned().unwrap_or_default())
            .depends(depends)
    }

    #[test]
    fn chain_ranks_dependencies_before_dependents() {
        let mut fields = vec![
            computed("c", &["b"]),
            computed("b", &["a"]),
            Field::new("a", FieldType::Int),
        ];
        let map = ordinals(&fields);
        let ranked = rank_fields("t", &mut fields, &map).expect("ranks");

        let order: Vec<&str> = ranked.iter().map(|&i| fields[i].name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(fields[2].rank(), 1);
        assert_eq!(fields[1].rank(), 2);
        assert_eq!(fields[0].rank(), 3);
    }

    #[test]
    fn dependents_are_forward_links() {
        let mut fields = vec![Field::new("a", FieldType::Int), computed("b", &["a"])];
        let map = ordinals(&fields);
        rank_fields("t", &mut fields, &map).expect("ranks");

        assert_eq!(fields[0].dependents(), &[1]);
        assert!(fields[1].dependents().is_empty());
    }

    #[test]
    fn opaque_fields_rank_last() {
        let mut fields = vec![
            Field::new("z", FieldType::Auto).convert(|_, _| Value::Int(0)),
            Field::new("a", FieldType::Int),
            computed("b", &["a"]),
        ];
        let map = ordinals(&fields);
        let ranked = rank_fields("t", &mut fields, &map).expect("ranks");

        let order: Vec<&str> = ranked.iter().map(|&i| fields[i].name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "z"]);
    }

    #[test]
    fn cycles_fail_with_a_path() {
        let mut fields = vec![computed("a", &["b"]), computed("b", &["a"])];
        let map = ordinals(&fields);
        let err = rank_fields("t", &mut fields, &map).expect_err("cycle");

        match err {
            SchemaError::CircularDependency { path, .. } => {
                assert!(path.contains("a") && path.contains("b"), "path was {path}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut fields = vec![computed("a", &["ghost"])];
        let map = ordinals(&fields);
        assert!(matches!(
            rank_fields("t", &mut fields, &map),
            Err(SchemaError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn depending_on_an_opaque_field_is_rejected() {
        let mut fields = vec![
            Field::new("z", FieldType::Auto).convert(|_, _| Value::Int(0)),
            computed("a", &["z"]),
        ];
        let map = ordinals(&fields);
        assert!(matches!(
            rank_fields("t", &mut fields, &map),
            Err(SchemaError::OpaqueDependency { .. })
        ));
    }
}
