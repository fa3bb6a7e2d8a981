use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::*;
use std::collections::HashMap;

use crate::error::AppError;
use crate::models::dto::{
    CategoryInfo, CourseDetailResponse, CourseListQuery, CourseListResponse, CourseSummary,
    CurrencyInfo, PriceQuote,
};
use crate::models::{course_categories, courses, enrollments};
use crate::services::currency::{Currency, format_amount};
use crate::services::enrollment_service::EnrollmentService;

/// Cours par page dans le catalogue
pub const COURSES_PER_PAGE: u64 = 9;
/// Cours de la même catégorie affichés sur la fiche
pub const RELATED_COURSES: u64 = 3;

pub struct CourseService;

impl CourseService {
    /// Devise demandée (KES si absente) ; un code inconnu est refusé
    pub fn parse_currency(code: Option<&str>) -> Result<Currency, AppError> {
        match code {
            None => Ok(Currency::default()),
            Some(c) if c.trim().is_empty() => Ok(Currency::default()),
            Some(c) => c.parse::<Currency>().map_err(AppError::Validation),
        }
    }

    pub fn currencies() -> Vec<CurrencyInfo> {
        Currency::ALL.iter().copied().map(CurrencyInfo::from).collect()
    }

    /// Prix d'un cours converti dans la devise demandée
    pub fn quote(course: &courses::Model, currency: Currency) -> PriceQuote {
        let price = currency.convert(course.effective_price());
        PriceQuote {
            currency,
            symbol: currency.symbol(),
            price,
            original_price: currency.convert(course.price),
            has_discount: course.has_discount(),
            savings: currency.convert(course.savings()),
            discount_percentage: course.discount_percentage(),
            formatted: format_amount(price, currency),
        }
    }

    pub fn summarize(
        course: &courses::Model,
        category: Option<&course_categories::Model>,
        currency: Currency,
    ) -> CourseSummary {
        CourseSummary {
            id: course.id,
            title: course.title.clone(),
            slug: course.slug.clone(),
            category: category.map(|c| c.name.clone()),
            overview: course.overview.clone(),
            duration: course.duration.clone(),
            schedule: course.schedule.clone(),
            is_featured: course.is_featured,
            pricing: Self::quote(course, currency),
        }
    }

    /// GET /courses : cours actifs, filtre catégorie + recherche, 9 par page
    pub async fn list_courses(
        db: &DatabaseConnection,
        query: &CourseListQuery,
    ) -> Result<CourseListResponse, AppError> {
        let currency = Self::parse_currency(query.currency.as_deref())?;

        let categories = course_categories::Entity::find()
            .order_by_asc(course_categories::Column::Order)
            .all(db)
            .await?;
        let by_id: HashMap<i32, &course_categories::Model> =
            categories.iter().map(|c| (c.id, c)).collect();

        let mut select = courses::Entity::find().filter(courses::Column::IsActive.eq(true));

        if let Some(name) = query.category.as_deref().filter(|n| !n.trim().is_empty()) {
            match categories.iter().find(|c| c.name == name.trim()) {
                Some(category) => {
                    select = select.filter(courses::Column::CategoryId.eq(category.id));
                }
                // Catégorie inconnue : liste vide, comme un filtre sans résultat
                None => select = select.filter(Expr::value(false)),
            }
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(title_contains(search));
        }

        let paginator = select
            .order_by_desc(courses::Column::IsFeatured)
            .order_by_desc(courses::Column::CreatedAt)
            .paginate(db, COURSES_PER_PAGE);

        let counts = paginator.num_items_and_pages().await?;
        // Page hors limites : on sert la dernière (ou la première si vide)
        let last_page = counts.number_of_pages.max(1);
        let page = query.page.unwrap_or(1).clamp(1, last_page);
        let page_courses = paginator.fetch_page(page - 1).await?;

        Ok(CourseListResponse {
            courses: page_courses
                .iter()
                .map(|c| Self::summarize(c, by_id.get(&c.category_id).copied(), currency))
                .collect(),
            page,
            total_pages: counts.number_of_pages,
            total_courses: counts.number_of_items,
            categories: categories
                .iter()
                .map(|c| CategoryInfo {
                    name: c.name.clone(),
                    display_name: c.display_name.clone(),
                })
                .collect(),
            currencies: Self::currencies(),
            selected_currency: currency,
        })
    }

    /// Cours actif par slug
    pub async fn find_active_by_slug<C: ConnectionTrait>(
        db: &C,
        slug: &str,
    ) -> Result<courses::Model, AppError> {
        courses::Entity::find()
            .filter(courses::Column::Slug.eq(slug))
            .filter(courses::Column::IsActive.eq(true))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
    }

    /// GET /courses/{slug} : fiche + inscription du user connecté
    pub async fn course_detail(
        db: &DatabaseConnection,
        slug: &str,
        currency: Option<&str>,
        user_id: Option<i32>,
    ) -> Result<CourseDetailResponse, AppError> {
        let currency = Self::parse_currency(currency)?;
        let course = Self::find_active_by_slug(db, slug).await?;

        let category = course_categories::Entity::find_by_id(course.category_id)
            .one(db)
            .await?;

        let related = courses::Entity::find()
            .filter(courses::Column::CategoryId.eq(course.category_id))
            .filter(courses::Column::IsActive.eq(true))
            .filter(courses::Column::Id.ne(course.id))
            .limit(RELATED_COURSES)
            .all(db)
            .await?;

        let enrollment = match user_id {
            Some(user_id) => enrollments::Entity::find()
                .filter(enrollments::Column::UserId.eq(user_id))
                .filter(enrollments::Column::CourseId.eq(course.id))
                .one(db)
                .await?
                .map(|e| EnrollmentService::summarize(&e, &course)),
            None => None,
        };

        Ok(CourseDetailResponse {
            course: Self::summarize(&course, category.as_ref(), currency),
            enrollment,
            related_courses: related
                .iter()
                .map(|c| Self::summarize(c, category.as_ref(), currency))
                .collect(),
        })
    }
}

/// Échappe les jokers LIKE (`\`, `%`, `_`) d'une saisie utilisateur
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Titre contenant le terme, insensible à la casse ; le terme est pris littéralement
fn title_contains(search: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(courses::Column::Title)))
        .like(LikeExpr::new(pattern).escape('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::courses::tests::course;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_in_kes_with_discount() {
        let c = course(dec!(120), Some(dec!(90)));
        let quote = CourseService::quote(&c, Currency::Kes);

        assert_eq!(quote.price, dec!(13500));
        assert_eq!(quote.original_price, dec!(18000));
        assert_eq!(quote.savings, dec!(4500));
        assert_eq!(quote.discount_percentage, 25);
        assert_eq!(quote.symbol, "KShs.");
        assert_eq!(quote.formatted, "KShs. 13500.00");
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        assert_eq!(escape_like("python"), "python");
        assert_eq!(escape_like("100%_off"), "100\\%\\_off");
        assert_eq!(escape_like(r"c:\data"), r"c:\\data");

        let stmt = courses::Entity::find()
            .filter(title_contains("50% OFF"))
            .build(DbBackend::Postgres);
        assert!(stmt.sql.contains("ESCAPE"));
        let values = stmt.values.unwrap().0;
        assert!(values.contains(&Value::String(Some(Box::new(r"%50\% off%".to_string())))));
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(CourseService::parse_currency(None).unwrap(), Currency::Kes);
        assert_eq!(CourseService::parse_currency(Some("")).unwrap(), Currency::Kes);
        assert_eq!(CourseService::parse_currency(Some("ngn")).unwrap(), Currency::Ngn);
        assert!(matches!(
            CourseService::parse_currency(Some("EUR")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_currencies_listing() {
        let codes: Vec<&str> = CourseService::currencies().iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["KES", "USD", "NGN"]);
    }

    #[tokio::test]
    async fn test_unknown_slug_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<courses::Model>::new()])
            .into_connection();

        let result = CourseService::find_active_by_slug(&db, "nope").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
