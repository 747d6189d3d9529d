//! Derived-query compiler: method name tokens to a predicate over the root
//! entity.
//!
//! Pipeline: subject/verb split, `OrderBy` split, `Or`/`And` split, then one
//! condition per part (property path + comparator suffix), rendered with
//! positional arguments.

use crate::model::entity::EntitySchema;
use crate::model::value::Value;
use crate::query::plan::{CountTarget, OrderTerm, PlanKind, Projection, QueryPlan};
use crate::query::{Args, Direction};
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;

const ROOT_ALIAS: &str = "e";
const LIKE_ESCAPE: char = '\\';

static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)(.*?)(?:By(.*))?$")
        .expect("valid subject regex")
});
/// `Top`/`First` opens the subject (after an optional `Distinct`) and is
/// followed by digits, a new word, or nothing.
static LIMIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Distinct)?(?:Top|First)(\d*)(?:[A-Z]|$)").expect("valid limit regex")
});
static ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z][A-Za-z0-9]*?)(Asc|Desc)").expect("valid order regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Find,
    Count,
    Exists,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    Not,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    In,
    NotIn,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            Self::Between => 2,
            _ => 1,
        }
    }

    fn supports_ignore_case(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::Not
                | Self::In
                | Self::NotIn
                | Self::Like
                | Self::NotLike
                | Self::StartingWith
                | Self::EndingWith
                | Self::Containing
                | Self::NotContaining
        )
    }
}

/// Comparator suffixes, longest first so `GreaterThanEqual` wins over
/// `GreaterThan` and `IsNotNull` over `Not`.
static SUFFIXES: Lazy<Vec<(&'static str, Operator)>> = Lazy::new(|| {
    let mut suffixes = vec![
        ("IsNotNull", Operator::IsNotNull),
        ("NotNull", Operator::IsNotNull),
        ("IsNull", Operator::IsNull),
        ("Null", Operator::IsNull),
        ("IsNotIn", Operator::NotIn),
        ("NotIn", Operator::NotIn),
        ("IsIn", Operator::In),
        ("In", Operator::In),
        ("IsNotLike", Operator::NotLike),
        ("NotLike", Operator::NotLike),
        ("IsLike", Operator::Like),
        ("Like", Operator::Like),
        ("IsStartingWith", Operator::StartingWith),
        ("StartingWith", Operator::StartingWith),
        ("StartsWith", Operator::StartingWith),
        ("IsEndingWith", Operator::EndingWith),
        ("EndingWith", Operator::EndingWith),
        ("EndsWith", Operator::EndingWith),
        ("IsNotContaining", Operator::NotContaining),
        ("NotContaining", Operator::NotContaining),
        ("IsContaining", Operator::Containing),
        ("Containing", Operator::Containing),
        ("Contains", Operator::Containing),
        ("IsGreaterThanEqual", Operator::GreaterThanEqual),
        ("GreaterThanEqual", Operator::GreaterThanEqual),
        ("IsGreaterThan", Operator::GreaterThan),
        ("GreaterThan", Operator::GreaterThan),
        ("IsLessThanEqual", Operator::LessThanEqual),
        ("LessThanEqual", Operator::LessThanEqual),
        ("IsLessThan", Operator::LessThan),
        ("LessThan", Operator::LessThan),
        ("IsAfter", Operator::GreaterThan),
        ("After", Operator::GreaterThan),
        ("IsBefore", Operator::LessThan),
        ("Before", Operator::LessThan),
        ("IsBetween", Operator::Between),
        ("Between", Operator::Between),
        ("IsTrue", Operator::True),
        ("True", Operator::True),
        ("IsFalse", Operator::False),
        ("False", Operator::False),
        ("IsNot", Operator::Not),
        ("Not", Operator::Not),
        ("Equals", Operator::Equals),
        ("IsEquals", Operator::Equals),
        ("Is", Operator::Equals),
    ];
    suffixes.sort_by(|left, right| right.0.len().cmp(&left.0.len()));
    suffixes
});

#[derive(Debug)]
struct Condition {
    column: String,
    operator: Operator,
    ignore_case: bool,
}

/// Renders conditions and collects their parameters.
struct Renderer<'a> {
    args: std::slice::Iter<'a, Value>,
    params: Vec<Value>,
}

impl Renderer<'_> {
    fn next_arg(&mut self) -> RepoResult<Value> {
        self.args
            .next()
            .cloned()
            .ok_or_else(|| RepoError::malformed("derived query received too few arguments"))
    }

    fn render(&mut self, condition: &Condition) -> RepoResult<String> {
        let column = if condition.ignore_case {
            format!("LOWER({})", condition.column)
        } else {
            condition.column.clone()
        };
        let placeholder = if condition.ignore_case { "LOWER(?)" } else { "?" };

        let sql = match condition.operator {
            Operator::Equals | Operator::Not => {
                let arg = self.next_arg()?;
                let negated = condition.operator == Operator::Not;
                if arg.is_null() {
                    let keyword = if negated { "IS NOT NULL" } else { "IS NULL" };
                    format!("{} {keyword}", condition.column)
                } else {
                    self.params.push(arg);
                    let operator = if negated { "<>" } else { "=" };
                    format!("{column} {operator} {placeholder}")
                }
            }
            Operator::GreaterThan => self.binary(&column, ">")?,
            Operator::GreaterThanEqual => self.binary(&column, ">=")?,
            Operator::LessThan => self.binary(&column, "<")?,
            Operator::LessThanEqual => self.binary(&column, "<=")?,
            Operator::Between => {
                let low = self.next_arg()?;
                let high = self.next_arg()?;
                self.params.push(low);
                self.params.push(high);
                format!("{column} BETWEEN ? AND ?")
            }
            Operator::In | Operator::NotIn => {
                let values = match self.next_arg()? {
                    Value::List(values) => values,
                    Value::Null => {
                        return Err(RepoError::malformed(format!(
                            "`In` on {} needs a list argument",
                            condition.column
                        )))
                    }
                    scalar => vec![scalar],
                };
                let placeholders = vec![placeholder; values.len()].join(", ");
                self.params.extend(values);
                let keyword = if condition.operator == Operator::In {
                    "IN"
                } else {
                    "NOT IN"
                };
                format!("{column} {keyword} ({placeholders})")
            }
            Operator::Like
            | Operator::NotLike
            | Operator::StartingWith
            | Operator::EndingWith
            | Operator::Containing
            | Operator::NotContaining => {
                let arg = self.next_arg()?;
                let Some(text) = arg.as_str() else {
                    return Err(RepoError::malformed(format!(
                        "like comparison on {} needs a text argument, got {}",
                        condition.column,
                        arg.type_name()
                    )));
                };
                // Caller-supplied `Like` patterns keep their wildcards; the
                // other forms match the argument literally.
                let (pattern, escaped) = match condition.operator {
                    Operator::StartingWith => (format!("{}%", escape_like(text)), true),
                    Operator::EndingWith => (format!("%{}", escape_like(text)), true),
                    Operator::Containing | Operator::NotContaining => {
                        (format!("%{}%", escape_like(text)), true)
                    }
                    _ => (text.to_string(), false),
                };
                self.params.push(Value::Text(pattern));
                let keyword = match condition.operator {
                    Operator::NotLike | Operator::NotContaining => "NOT LIKE",
                    _ => "LIKE",
                };
                if escaped {
                    format!("{column} {keyword} {placeholder} ESCAPE '{LIKE_ESCAPE}'")
                } else {
                    format!("{column} {keyword} {placeholder}")
                }
            }
            Operator::IsNull => format!("{column} IS NULL"),
            Operator::IsNotNull => format!("{column} IS NOT NULL"),
            Operator::True => format!("{column} = 1"),
            Operator::False => format!("{column} = 0"),
        };
        Ok(sql)
    }

    fn binary(&mut self, column: &str, operator: &str) -> RepoResult<String> {
        let arg = self.next_arg()?;
        self.params.push(arg);
        Ok(format!("{column} {operator} ?"))
    }
}

/// Compiles a derived method name into a plan over `schema`.
pub(super) fn compile(
    schema: &'static EntitySchema,
    name: &str,
    args: &Args,
) -> RepoResult<QueryPlan> {
    let captures = SUBJECT_RE.captures(name).ok_or_else(|| {
        RepoError::malformed(format!("`{name}` does not start with a query verb"))
    })?;
    let verb = match captures.get(1).map_or("", |m| m.as_str()) {
        "count" => Verb::Count,
        "exists" => Verb::Exists,
        "delete" | "remove" => Verb::Delete,
        _ => Verb::Find,
    };
    let subject = captures.get(2).map_or("", |m| m.as_str());
    let predicate = captures.get(3).map_or("", |m| m.as_str());

    let mut plan = QueryPlan::new(PlanKind::Select, schema, ROOT_ALIAS, name);
    plan.distinct = subject.contains("Distinct");
    if let Some(limit) = LIMIT_RE.captures(subject) {
        let digits = limit.get(1).map_or("", |m| m.as_str());
        let limit = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<usize>()
                .map_err(|err| RepoError::malformed(format!("bad limit in `{name}`: {err}")))?
        };
        if limit == 0 {
            return Err(RepoError::malformed(format!("`{name}` limits results to zero rows")));
        }
        plan.limit = Some(limit);
    }
    match verb {
        Verb::Count => {
            plan.projection = if plan.distinct {
                Projection::Count(CountTarget::Expr {
                    expr: format!("{ROOT_ALIAS}.{}", schema.id.column),
                    distinct: true,
                })
            } else {
                Projection::Count(CountTarget::Rows)
            };
        }
        Verb::Exists => {
            plan.projection = Projection::Count(CountTarget::Rows);
        }
        Verb::Find | Verb::Delete => {}
    }

    let (conditions_part, order_part) = match predicate.find("OrderBy") {
        Some(index) => (&predicate[..index], Some(&predicate[index + "OrderBy".len()..])),
        None => (predicate, None),
    };
    let (conditions_part, all_ignore_case) = match conditions_part.strip_suffix("AllIgnoreCase") {
        Some(rest) => (rest, true),
        None => (conditions_part, false),
    };

    let values: Vec<Value> = args.values().cloned().collect();
    let mut renderer = Renderer {
        args: values.iter(),
        params: Vec::new(),
    };
    let mut disjuncts = Vec::new();
    let mut expected = 0usize;
    if !conditions_part.is_empty() {
        for or_part in split_keyword(conditions_part, "Or")? {
            let mut conjuncts = Vec::new();
            for and_part in split_keyword(or_part, "And")? {
                let condition = parse_condition(&mut plan, and_part, all_ignore_case)?;
                expected += condition.operator.arity();
                conjuncts.push(condition);
            }
            disjuncts.push(conjuncts);
        }
    }
    if expected != values.len() {
        return Err(RepoError::malformed(format!(
            "`{name}` expects {expected} arguments, got {}",
            values.len()
        )));
    }

    let mut rendered = Vec::with_capacity(disjuncts.len());
    for conjuncts in &disjuncts {
        let parts = conjuncts
            .iter()
            .map(|condition| renderer.render(condition))
            .collect::<RepoResult<Vec<_>>>()?;
        rendered.push(parts.join(" AND "));
    }
    if !rendered.is_empty() {
        plan.predicate = Some(if rendered.len() == 1 {
            rendered.remove(0)
        } else {
            rendered
                .iter()
                .map(|part| format!("({part})"))
                .collect::<Vec<_>>()
                .join(" OR ")
        });
        let mut aliases = vec![ROOT_ALIAS.to_string()];
        aliases.extend(plan.joins.iter().map(|join| join.alias.clone()));
        plan.predicate_aliases = aliases;
    }
    plan.params = renderer.params;

    if let Some(order_part) = order_part {
        plan.order = parse_order(schema, order_part, name)?;
    }
    Ok(plan)
}

/// Splits `input` on `keyword` where it starts a new capitalized token.
fn split_keyword<'a>(input: &'a str, keyword: &str) -> RepoResult<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let bytes = input.as_bytes();
    let mut index = 1;
    while index + keyword.len() < input.len() {
        let boundary = input.is_char_boundary(index)
            && input[index..].starts_with(keyword)
            && bytes[index + keyword.len()].is_ascii_uppercase();
        if boundary {
            parts.push(&input[start..index]);
            start = index + keyword.len();
            index = start + 1;
        } else {
            index += 1;
        }
    }
    parts.push(&input[start..]);
    if parts.iter().any(|part| part.is_empty()) {
        return Err(RepoError::malformed(format!(
            "empty condition around `{keyword}` in `{input}`"
        )));
    }
    Ok(parts)
}

fn parse_condition(
    plan: &mut QueryPlan,
    part: &str,
    all_ignore_case: bool,
) -> RepoResult<Condition> {
    let (part, explicit_ignore_case) = match part
        .strip_suffix("IgnoringCase")
        .or_else(|| part.strip_suffix("IgnoreCase"))
    {
        Some(rest) => (rest, true),
        None => (part, false),
    };

    let mut matched = None;
    for (suffix, operator) in SUFFIXES.iter() {
        if let Some(property) = part.strip_suffix(suffix) {
            if property.is_empty() {
                continue;
            }
            if let Some(column) = resolve_property(plan, property) {
                matched = Some((column, *operator));
                break;
            }
        }
    }
    let (column, operator) = match matched {
        Some(found) => found,
        None => {
            let column = resolve_property(plan, part).ok_or_else(|| {
                RepoError::malformed(format!(
                    "{} has no property matching `{part}`",
                    plan.root.name
                ))
            })?;
            (column, Operator::Equals)
        }
    };

    if explicit_ignore_case && !operator.supports_ignore_case() {
        return Err(RepoError::malformed(format!(
            "IgnoreCase is not supported for `{part}`"
        )));
    }
    // AllIgnoreCase only applies where case folding makes sense.
    let ignore_case =
        explicit_ignore_case || (all_ignore_case && operator.supports_ignore_case());
    Ok(Condition {
        column,
        operator,
        ignore_case,
    })
}

/// Resolves a capitalized property path (`Username`, `TeamName`) to a
/// qualified column, adding an inner join for nested paths.
fn resolve_property(plan: &mut QueryPlan, path: &str) -> Option<String> {
    let property = decapitalize(path);
    if let Some(column) = plan.root.column_of(&property) {
        return Some(format!("{ROOT_ALIAS}.{column}"));
    }
    for relation in plan.root.relations {
        let Some(rest) = property.strip_prefix(relation.name) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let target = (relation.target)();
        let Some(column) = target.column_of(&decapitalize(rest)) else {
            continue;
        };
        let alias = match plan.join_for(relation.name) {
            Some(join) => join.alias.clone(),
            None => plan.ensure_join(relation, false),
        };
        return Some(format!("{alias}.{column}"));
    }
    None
}

fn parse_order(
    schema: &'static EntitySchema,
    order: &str,
    name: &str,
) -> RepoResult<Vec<OrderTerm>> {
    let mut terms = Vec::new();
    let mut consumed = 0;
    for captures in ORDER_RE.captures_iter(order) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            break;
        }
        consumed = whole.end();
        let property = captures.get(1).map_or("", |m| m.as_str());
        let direction = match captures.get(2).map(|m| m.as_str()) {
            Some("Desc") => Direction::Desc,
            _ => Direction::Asc,
        };
        terms.push(order_term(schema, property, direction, name)?);
    }
    let rest = &order[consumed..];
    if !rest.is_empty() {
        terms.push(order_term(schema, rest, Direction::Asc, name)?);
    }
    if terms.is_empty() {
        return Err(RepoError::malformed(format!("`{name}` has an empty OrderBy")));
    }
    Ok(terms)
}

fn order_term(
    schema: &'static EntitySchema,
    property: &str,
    direction: Direction,
    name: &str,
) -> RepoResult<OrderTerm> {
    let column = schema.column_of(&decapitalize(property)).ok_or_else(|| {
        RepoError::malformed(format!(
            "`{name}` orders by unknown {} property `{property}`",
            schema.name
        ))
    })?;
    Ok(OrderTerm {
        expr: format!("{ROOT_ALIAS}.{column}"),
        direction,
    })
}

/// Escapes `LIKE` wildcards (and the escape character itself).
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_') || ch == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

fn decapitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::model::entity::Entity;
    use crate::model::member::Member;
    use crate::model::value::Value;
    use crate::query::plan::Projection;
    use crate::query::{Args, Direction};
    use crate::repo::error::RepoError;

    #[test]
    fn and_with_greater_than_binds_in_order() {
        let args = Args::new().with("username", "AAA").with("age", 15);
        let plan = compile(Member::schema(), "findByUsernameAndAgeGreaterThan", &args).unwrap();
        assert_eq!(
            plan.predicate.as_deref(),
            Some("e.username = ? AND e.age > ?")
        );
        assert_eq!(plan.params, vec![Value::from("AAA"), Value::Integer(15)]);
    }

    #[test]
    fn top_subject_sets_limit_without_predicate() {
        let plan = compile(Member::schema(), "findTop3HelloBy", &Args::new()).unwrap();
        assert_eq!(plan.limit, Some(3));
        assert!(plan.predicate.is_none());
    }

    #[test]
    fn limit_keyword_must_open_the_subject() {
        let plan = compile(Member::schema(), "findFirstnameBy", &Args::new()).unwrap();
        assert_eq!(plan.limit, None);

        let plan = compile(Member::schema(), "findMembersTop3By", &Args::new()).unwrap();
        assert_eq!(plan.limit, None);

        let plan = compile(Member::schema(), "findFirstBy", &Args::new()).unwrap();
        assert_eq!(plan.limit, Some(1));

        let plan = compile(Member::schema(), "findDistinctTop10MembersBy", &Args::new()).unwrap();
        assert_eq!(plan.limit, Some(10));
        assert!(plan.distinct);
    }

    #[test]
    fn null_argument_renders_is_null() {
        let args = Args::new().with("team", Value::Null);
        let plan = compile(Member::schema(), "findByTeam", &args).unwrap();
        assert_eq!(plan.predicate.as_deref(), Some("e.team_id IS NULL"));
        assert!(plan.params.is_empty());
    }

    #[test]
    fn in_expands_list_arguments() {
        let args = Args::new().with("names", vec!["AAA", "BBB"]);
        let plan = compile(Member::schema(), "findByUsernameIn", &args).unwrap();
        assert_eq!(plan.predicate.as_deref(), Some("e.username IN (?, ?)"));
        assert_eq!(plan.params.len(), 2);
    }

    #[test]
    fn or_groups_and_ordering() {
        let args = Args::new().with("a", "AAA").with("b", 10).with("c", 30);
        let plan = compile(
            Member::schema(),
            "findByUsernameOrAgeBetweenOrderByAgeDescUsername",
            &args,
        )
        .unwrap();
        assert_eq!(
            plan.predicate.as_deref(),
            Some("(e.username = ?) OR (e.age BETWEEN ? AND ?)")
        );
        assert_eq!(plan.order.len(), 2);
        assert_eq!(plan.order[0].direction, Direction::Desc);
        assert_eq!(plan.order[1].expr, "e.username");
    }

    #[test]
    fn nested_relation_path_adds_inner_join() {
        let args = Args::new().with("name", "teamA");
        let plan = compile(Member::schema(), "findByTeamName", &args).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert!(!plan.joins[0].left);
        assert_eq!(plan.predicate.as_deref(), Some("e_team.name = ?"));
    }

    #[test]
    fn starting_with_ignore_case_wraps_both_sides() {
        let args = Args::new().with("prefix", "me");
        let plan =
            compile(Member::schema(), "findByUsernameStartingWithIgnoreCase", &args).unwrap();
        assert_eq!(
            plan.predicate.as_deref(),
            Some("LOWER(e.username) LIKE LOWER(?) ESCAPE '\\'")
        );
        assert_eq!(plan.params, vec![Value::from("me%")]);
    }

    #[test]
    fn count_verb_projects_count() {
        let args = Args::new().with("age", 10);
        let plan = compile(Member::schema(), "countByAge", &args).unwrap();
        assert!(matches!(plan.projection, Projection::Count(_)));
    }

    #[test]
    fn unknown_property_is_malformed() {
        let args = Args::new().with("nickname", "x");
        let err = compile(Member::schema(), "findByNickname", &args).unwrap_err();
        assert!(matches!(err, RepoError::Malformed(_)));
    }

    #[test]
    fn argument_count_mismatch_is_malformed() {
        let err = compile(Member::schema(), "findByUsername", &Args::new()).unwrap_err();
        assert!(matches!(err, RepoError::Malformed(_)));
    }

    #[test]
    fn containing_escapes_wildcards_but_like_keeps_them() {
        let args = Args::new().with("username", r"50%_a\b");
        let plan = compile(Member::schema(), "findByUsernameContaining", &args).unwrap();
        assert_eq!(plan.params, vec![Value::from(r"%50\%\_a\\b%")]);

        let args = Args::new().with("username", "50%");
        let plan = compile(Member::schema(), "findByUsernameLike", &args).unwrap();
        assert_eq!(plan.predicate.as_deref(), Some("e.username LIKE ?"));
        assert_eq!(plan.params, vec![Value::from("50%")]);
    }

    #[test]
    fn like_needs_text() {
        let args = Args::new().with("username", 3);
        let err = compile(Member::schema(), "findByUsernameContaining", &args).unwrap_err();
        assert!(err.to_string().contains("text argument"));
    }
}
