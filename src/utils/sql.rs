use sqlx::{Encode, Postgres, QueryBuilder, Type};
use uuid::Uuid;

/// `UPDATE <table> SET ...` that only touches the columns given a value, scoped to one owner's row.
pub struct PartialUpdate<'args> {
    qb: QueryBuilder<'args, Postgres>,
    fields: usize,
}

impl<'args> PartialUpdate<'args> {
    pub fn new(table: &str) -> Self {
        Self {
            qb: QueryBuilder::new(format!("UPDATE {table} SET ")),
            fields: 0,
        }
    }

    fn column(&mut self, column: &str) {
        if self.fields > 0 {
            self.qb.push(", ");
        }
        self.qb.push(column);
        self.qb.push(" = ");
        self.fields += 1;
    }

    /// Sets the column only when a value is given.
    pub fn set<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres>,
    {
        if let Some(value) = value {
            self.assign(column, value);
        }
        self
    }

    /// Always binds; an `Option` value of `None` writes NULL.
    pub fn assign<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres>,
    {
        self.column(column);
        self.qb.push_bind(value);
        self
    }

    /// Raw SQL expression, e.g. `now()`.
    pub fn set_expr(&mut self, column: &str, expr: &str) -> &mut Self {
        self.column(column);
        self.qb.push(expr);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields == 0
    }

    pub fn finish(mut self, id: Uuid, user_id: Uuid) -> QueryBuilder<'args, Postgres> {
        self.qb.push(" WHERE id = ");
        self.qb.push_bind(id);
        self.qb.push(" AND user_id = ");
        self.qb.push_bind(user_id);
        self.qb.push(" RETURNING *");
        self.qb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_present_columns_are_set() {
        let mut update = PartialUpdate::new("customers");
        update
            .set("name", Some("Jane".to_string()))
            .set::<String>("email", None)
            .set("phone", Some("0412345678".to_string()))
            .set_expr("updated_at", "now()");
        assert!(!update.is_empty());

        let qb = update.finish(Uuid::nil(), Uuid::nil());
        assert_eq!(
            qb.sql(),
            "UPDATE customers SET name = $1, phone = $2, updated_at = now() WHERE id = $3 AND user_id = $4 RETURNING *"
        );
    }

    #[test]
    fn assign_binds_null() {
        let mut update = PartialUpdate::new("customers");
        update.assign::<Option<String>>("email", None);
        let qb = update.finish(Uuid::nil(), Uuid::nil());
        assert!(qb.sql().starts_with("UPDATE customers SET email = $1 WHERE"));
    }

    #[test]
    fn nothing_set_is_empty() {
        let mut update = PartialUpdate::new("quotes");
        update.set::<i64>("total", None);
        assert!(update.is_empty());
    }
}
