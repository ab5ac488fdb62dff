//! Prompt builders that turn portfolio and token market data into analysis
//! instructions for the model.

use serde::Deserialize;

/// Holdings listed individually in a portfolio prompt; the rest are omitted.
pub const MAX_LISTED_HOLDINGS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub value: f64,
    pub allocation: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub btc_price: f64,
    #[serde(default)]
    pub total_market_cap: f64,
    #[serde(default)]
    pub btc_dominance: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortfolioAnalysisRequest {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub market_data: MarketData,
}

/// Indicators are optional; RSI and MACD are echoed verbatim when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TechnicalData {
    #[serde(default)]
    pub rsi: Option<serde_json::Value>,
    #[serde(default)]
    pub macd: Option<serde_json::Value>,
    #[serde(default)]
    pub support: Option<f64>,
    #[serde(default)]
    pub resistance: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenAnalysisRequest {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub change_24h: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub technical_data: TechnicalData,
}

pub fn build_portfolio_prompt(request: &PortfolioAnalysisRequest) -> String {
    let mut prompt = format!(
        "Analyze this cryptocurrency portfolio and provide professional financial insights:\n\
         \n\
         Portfolio Value: {}\n\
         Holdings: {} tokens\n\
         \n\
         Top Holdings:\n",
        format_usd(request.total_value, 2),
        request.holdings.len()
    );

    for holding in request.holdings.iter().take(MAX_LISTED_HOLDINGS) {
        prompt.push_str(&format!(
            "- {}: {} ({:.1}%)\n",
            holding.symbol,
            format_usd(holding.value, 2),
            holding.allocation
        ));
    }

    let market = &request.market_data;
    prompt.push_str(&format!(
        "\n\
         Market Context:\n\
         - BTC Price: {}\n\
         - Market Cap: {}\n\
         - BTC Dominance: {:.1}%\n\
         \n\
         Provide:\n\
         1. Portfolio risk assessment (1-2 sentences)\n\
         2. Diversification analysis (1-2 sentences)\n\
         3. Top 3 actionable recommendations\n\
         4. Key risk factors to monitor\n\
         \n\
         Keep the analysis professional, concise, and actionable.",
        format_usd(market.btc_price, 2),
        format_usd(market.total_market_cap, 2),
        market.btc_dominance
    ));

    prompt
}

pub fn build_token_prompt(request: &TokenAnalysisRequest) -> String {
    let technical = &request.technical_data;

    format!(
        "Analyze {symbol} cryptocurrency with the following data:\n\
         \n\
         Price: {price}\n\
         24h Change: {change:+.2}%\n\
         Volume: {volume}\n\
         Market Cap: {market_cap}\n\
         \n\
         Technical Indicators:\n\
         - RSI: {rsi}\n\
         - MACD: {macd}\n\
         - Support: {support}\n\
         - Resistance: {resistance}\n\
         \n\
         Provide:\n\
         1. Trading recommendation (Buy/Hold/Sell) with confidence level\n\
         2. Key technical levels to watch\n\
         3. Risk factors\n\
         4. Short-term outlook (1-2 sentences)\n\
         \n\
         Keep the analysis professional and actionable.",
        symbol = request.symbol.as_deref().unwrap_or("N/A"),
        price = format_usd(request.price, 2),
        change = request.change_24h,
        volume = format_usd(request.volume, 0),
        market_cap = format_usd(request.market_cap, 0),
        rsi = indicator(&technical.rsi),
        macd = indicator(&technical.macd),
        support = format_usd(technical.support.unwrap_or(0.0), 2),
        resistance = format_usd(technical.resistance.unwrap_or(0.0), 2),
    )
}

fn indicator(value: &Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "N/A".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `$` followed by the value with comma thousands separators and fixed decimals,
/// e.g. `$1,234.50`. Negative values keep their sign after the currency symbol.
pub fn format_usd(value: f64, decimals: usize) -> String {
    format!("${}", group_thousands(value, decimals))
}

fn group_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, value: f64, allocation: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            value,
            allocation,
        }
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(50000.0, 2), "$50,000.00");
        assert_eq!(format_usd(1_000_000_000_000.0, 0), "$1,000,000,000,000");
        assert_eq!(format_usd(999.999, 2), "$1,000.00");
        assert_eq!(format_usd(12.5, 2), "$12.50");
        assert_eq!(format_usd(0.0, 2), "$0.00");
        assert_eq!(format_usd(-1234.5, 2), "$-1,234.50");
    }

    #[test]
    fn test_portfolio_prompt_lists_first_five_in_order() {
        let symbols = ["ETH", "BTC", "SOL", "ADA", "DOT", "AVAX", "LINK"];
        let request = PortfolioAnalysisRequest {
            holdings: symbols
                .iter()
                .enumerate()
                .map(|(i, s)| holding(s, 1000.0 * (i + 1) as f64, 10.0 + i as f64))
                .collect(),
            total_value: 28000.0,
            market_data: MarketData {
                btc_price: 65000.0,
                total_market_cap: 2_400_000_000_000.0,
                btc_dominance: 52.34,
            },
        };

        let prompt = build_portfolio_prompt(&request);

        assert!(prompt.contains("Portfolio Value: $28,000.00"));
        assert!(prompt.contains("Holdings: 7 tokens"));
        assert!(prompt.contains("- ETH: $1,000.00 (10.0%)"));
        assert!(prompt.contains("- DOT: $5,000.00 (14.0%)"));
        assert!(!prompt.contains("AVAX"));
        assert!(!prompt.contains("LINK"));

        let positions: Vec<usize> = symbols[..5]
            .iter()
            .map(|s| prompt.find(&format!("- {}:", s)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(prompt.contains("- BTC Price: $65,000.00"));
        assert!(prompt.contains("- Market Cap: $2,400,000,000,000.00"));
        assert!(prompt.contains("- BTC Dominance: 52.3%"));
        assert!(prompt.contains("3. Top 3 actionable recommendations"));
        assert!(prompt.ends_with("Keep the analysis professional, concise, and actionable."));
    }

    #[test]
    fn test_portfolio_prompt_defaults() {
        let request: PortfolioAnalysisRequest = serde_json::from_str("{}").unwrap();
        let prompt = build_portfolio_prompt(&request);
        assert!(prompt.contains("Portfolio Value: $0.00"));
        assert!(prompt.contains("Holdings: 0 tokens"));
        assert!(prompt.contains("- BTC Dominance: 0.0%"));
    }

    #[test]
    fn test_token_prompt_missing_indicators() {
        let request: TokenAnalysisRequest =
            serde_json::from_str(r#"{"symbol": "ETH", "price": 3000, "technical_data": {}}"#)
                .unwrap();
        let prompt = build_token_prompt(&request);

        assert!(prompt.contains("- RSI: N/A"));
        assert!(prompt.contains("- MACD: N/A"));
        assert!(prompt.contains("- Support: $0.00"));
        assert!(prompt.contains("- Resistance: $0.00"));
        assert!(prompt.contains("24h Change: +0.00%"));
    }

    #[test]
    fn test_token_prompt_example() {
        let request: TokenAnalysisRequest = serde_json::from_str(
            r#"{"symbol":"BTC","price":50000,"change_24h":2.5,"volume":1000000000,
                "market_cap":1000000000000,"technical_data":{"rsi":65}}"#,
        )
        .unwrap();
        let prompt = build_token_prompt(&request);

        assert!(prompt.starts_with("Analyze BTC cryptocurrency"));
        assert!(prompt.contains("Price: $50,000.00"));
        assert!(prompt.contains("24h Change: +2.50%"));
        assert!(prompt.contains("Volume: $1,000,000,000"));
        assert!(prompt.contains("Market Cap: $1,000,000,000,000"));
        assert!(prompt.contains("RSI: 65"));
        assert!(prompt.contains("1. Trading recommendation (Buy/Hold/Sell) with confidence level"));
    }

    #[test]
    fn test_token_prompt_negative_change_and_text_indicator() {
        let request: TokenAnalysisRequest = serde_json::from_str(
            r#"{"symbol":"SOL","change_24h":-3.456,"technical_data":{"macd":"bearish cross","rsi":41.5}}"#,
        )
        .unwrap();
        let prompt = build_token_prompt(&request);

        assert!(prompt.contains("24h Change: -3.46%"));
        assert!(prompt.contains("- MACD: bearish cross"));
        assert!(prompt.contains("- RSI: 41.5"));
    }
}
