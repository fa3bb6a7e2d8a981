// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table PostgreSQL avec SeaORM.
//
// Liste des modules:
//   - users : Utilisateurs (inactifs tant que l'email n'est pas vérifié)
//   - user_profiles : Profil 1-1 (rôle learner / instructor)
//   - email_verification_tokens : Tokens de vérification email (expire 24h)
//   - password_reset_tokens : Tokens de reset password (expire 1h)
//   - course_categories : Catégories du catalogue
//   - courses : Cours (prix en USD)
//   - capstone_projects : Projets capstone d'un cours
//   - enrollments : Inscriptions (plan de paiement + code d'activation)
//   - payment_installments : Échéances de paiement d'une inscription
//   - project_enrollments : Suivi soumission / revue des projets
//   - dto : Data Transfer Objects pour les requêtes / réponses API
//   - health : Health check API
//
// Points d'attention:
//   - Tous les modèles utilisent SeaORM (pas de SQL brut)
//   - Les statuts sont des enums stockés en VARCHAR (DeriveActiveEnum)
//   - Les relations entre tables sont définies dans chaque modèle
//
// ============================================================================

pub mod health;
pub mod dto;
pub mod users;
pub mod user_profiles;
pub mod email_verification_tokens;
pub mod password_reset_tokens;
pub mod course_categories;
pub mod courses;
pub mod capstone_projects;
pub mod enrollments;
pub mod payment_installments;
pub mod project_enrollments;
