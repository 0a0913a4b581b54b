//! Page requests and sort orders.

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering on a single property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Property path, e.g. `title` or `address.city`.
    pub property: String,
    /// Direction.
    pub direction: Direction,
    /// Compare case-insensitively.
    pub ignore_case: bool,
}

impl Order {
    /// Ascending order on `property`.
    #[must_use]
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
            ignore_case: false,
        }
    }

    /// Descending order on `property`.
    #[must_use]
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
            ignore_case: false,
        }
    }

    /// Compares case-insensitively.
    #[must_use]
    pub const fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub(crate) fn render(&self, column: &str) -> String {
        if self.ignore_case {
            format!("LOWER({column}) {}", self.direction.keyword())
        } else {
            format!("{column} {}", self.direction.keyword())
        }
    }
}

/// Ordered list of sort orders. Empty means unsorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    /// Unsorted.
    #[must_use]
    pub const fn unsorted() -> Self {
        Self { orders: Vec::new() }
    }

    /// Sorted by the given orders.
    #[must_use]
    pub const fn by(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    /// Appends an order.
    #[must_use]
    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// The orders, in priority order.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Whether any order is declared.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        !self.orders.is_empty()
    }
}

/// A page request. A size of zero means unpaged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pageable {
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return.
    pub size: u64,
    /// Sort applied before paging.
    pub sort: Sort,
}

impl Pageable {
    /// Page `number` (zero based) of `size` rows.
    #[must_use]
    pub const fn from(number: u64, size: u64) -> Self {
        Self {
            offset: number * size,
            size,
            sort: Sort::unsorted(),
        }
    }

    /// No paging.
    #[must_use]
    pub const fn unpaged() -> Self {
        Self {
            offset: 0,
            size: 0,
            sort: Sort::unsorted(),
        }
    }

    /// Applies a sort.
    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Whether the request limits rows.
    #[must_use]
    pub const fn is_paged(&self) -> bool {
        self.size > 0
    }
}

/// Renders the pagination clause for a page request.
///
/// Empty for unpaged requests. Otherwise ` OFFSET n ROWS ` (only when the
/// offset is non-zero) followed by `FETCH NEXT m ROWS ONLY `. The clause
/// carries its own leading space and is appended to the statement as is.
#[must_use]
pub fn build_pagination(pageable: &Pageable) -> String {
    if !pageable.is_paged() {
        return String::new();
    }
    let mut clause = String::from(" ");
    if pageable.offset != 0 {
        clause.push_str(&format!("OFFSET {} ROWS ", pageable.offset));
    }
    clause.push_str(&format!("FETCH NEXT {} ROWS ONLY ", pageable.size));
    clause
}
