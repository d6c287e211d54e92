use rusqlite::Row;

/// A struct which can be rebuilt from a fixed set of columns of a query.
pub trait SqlStruct
where
    Self: Sized,
{
    /// Returns all SQL expressions this struct needs in order to be built in
    /// [`SqlStruct::from_row`].
    fn select_exprs() -> &'static [&'static str];

    /// Reconstructs the implementor of this trait from a row, following the schema of
    /// [`SqlStruct::select_exprs`] in the same order, beginning at column `offset`.
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self>;

    /// How many columns [`SqlStruct::from_row`] consumes.
    #[must_use]
    fn column_count() -> usize {
        Self::select_exprs().len()
    }
}

/// Joins the select expressions of `T` for use in a `SELECT` clause.
#[must_use]
pub fn select_list<T: SqlStruct>() -> String {
    T::select_exprs().join(", ")
}
