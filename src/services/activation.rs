use rand::Rng;
use sea_orm::*;

use crate::models::enrollments;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;

/// Génère un code XXXX-XXXX-XXXX-XXXX (majuscules + chiffres)
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let groups: Vec<String> = (0..GROUPS)
        .map(|_| {
            (0..GROUP_LEN)
                .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
                .collect()
        })
        .collect();
    groups.join("-")
}

/// Vérifie le format d'un code saisi (après normalisation)
pub fn is_well_formed(code: &str) -> bool {
    let groups: Vec<&str> = code.split('-').collect();
    groups.len() == GROUPS
        && groups.iter().all(|g| {
            g.len() == GROUP_LEN
                && g.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        })
}

/// Normalise une saisie utilisateur : espaces retirés, majuscules
pub fn normalize(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Génère un code absent de la table enrollments.
/// Boucle jusqu'à trouver un code libre ; la contrainte UNIQUE de la BD
/// reste la vraie garantie en cas de course entre deux requêtes.
pub async fn generate_unique_code<C: ConnectionTrait>(db: &C) -> Result<String, DbErr> {
    loop {
        let code = generate_code(&mut rand::thread_rng());

        let taken = enrollments::Entity::find()
            .filter(enrollments::Column::ActivationCode.eq(&code))
            .count(db)
            .await?;

        if taken == 0 {
            return Ok(code);
        }

        tracing::debug!(code = %code, "activation code collision, retrying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_generated_codes_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 19);
            assert!(is_well_formed(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_generated_codes_do_not_repeat() {
        let mut rng = StdRng::seed_from_u64(11);
        let codes: HashSet<String> = (0..1000).map(|_| generate_code(&mut rng)).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_normalize_and_format_check() {
        assert_eq!(normalize("  ab12-cd34-ef56-gh78 "), "AB12-CD34-EF56-GH78");
        assert!(is_well_formed("AB12-CD34-EF56-GH78"));
        assert!(!is_well_formed("AB12CD34EF56GH78"));
        assert!(!is_well_formed("AB12-CD34-EF56-GH7"));
        assert!(!is_well_formed("ab12-cd34-ef56-gh78"));
    }

    #[tokio::test]
    async fn test_unique_code_retries_on_collision() {
        // 1er COUNT => code déjà pris, 2e COUNT => libre
        let taken = std::collections::BTreeMap::from([(
            "num_items".to_string(),
            Value::BigInt(Some(1)),
        )]);
        let free = std::collections::BTreeMap::from([(
            "num_items".to_string(),
            Value::BigInt(Some(0)),
        )]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![taken], vec![free]])
            .into_connection();

        let code = generate_unique_code(&db).await.unwrap();
        assert!(is_well_formed(&code));

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
    }
}
