// Conversion des prix (stockés en USD) vers la devise choisie.
// Taux fixes, pas de moteur de pricing.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 1 USD = 150 KES (approximatif)
pub const USD_TO_KES_RATE: Decimal = Decimal::from_parts(150, 0, 0, false, 0);
/// 1 USD = 800 NGN (approximatif)
pub const USD_TO_NGN_RATE: Decimal = Decimal::from_parts(800, 0, 0, false, 0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(3))")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[sea_orm(string_value = "KES")]
    Kes,
    #[sea_orm(string_value = "USD")]
    Usd,
    #[sea_orm(string_value = "NGN")]
    Ngn,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Kes, Currency::Usd, Currency::Ngn];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Kes => "KES",
            Currency::Usd => "USD",
            Currency::Ngn => "NGN",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Currency::Kes => "Kenyan Shillings",
            Currency::Usd => "US Dollars",
            Currency::Ngn => "Nigerian Nairas",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Kes => "KShs.",
            Currency::Usd => "$",
            Currency::Ngn => "₦",
        }
    }

    /// Taux depuis l'USD
    pub fn rate(&self) -> Decimal {
        match self {
            Currency::Kes => USD_TO_KES_RATE,
            Currency::Usd => Decimal::ONE,
            Currency::Ngn => USD_TO_NGN_RATE,
        }
    }

    /// Convertit un montant USD dans cette devise
    pub fn convert(&self, amount_usd: Decimal) -> Decimal {
        amount_usd * self.rate()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Kes
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "KES" => Ok(Currency::Kes),
            "USD" => Ok(Currency::Usd),
            "NGN" => Ok(Currency::Ngn),
            other => Err(format!("Unsupported currency: {}", other)),
        }
    }
}

/// Formate un montant pour l'affichage : "KShs. 15000.00"
pub fn format_amount(amount: Decimal, currency: Currency) -> String {
    format!("{} {:.2}", currency.symbol(), amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_convert_uses_fixed_rates() {
        assert_eq!(Currency::Usd.convert(dec!(100)), dec!(100));
        assert_eq!(Currency::Kes.convert(dec!(100)), dec!(15000));
        assert_eq!(Currency::Ngn.convert(dec!(99.50)), dec!(79600));
    }

    #[test]
    fn test_parse_currency_codes() {
        assert_eq!("kes".parse::<Currency>().unwrap(), Currency::Kes);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("NGN".parse::<Currency>().unwrap(), Currency::Ngn);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn test_default_is_kes() {
        assert_eq!(Currency::default(), Currency::Kes);
        assert_eq!(Currency::default().symbol(), "KShs.");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(50), Currency::Usd), "$ 50.00");
        assert_eq!(format_amount(dec!(33.333), Currency::Kes), "KShs. 33.33");
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&Currency::Ngn).unwrap();
        assert_eq!(json, "\"NGN\"");
        let parsed: Currency = serde_json::from_str("\"KES\"").unwrap();
        assert_eq!(parsed, Currency::Kes);
    }
}
