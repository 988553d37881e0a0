use crate::errors::PricingError;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Market inputs for a single European option valuation.
///
/// Argument order everywhere in this crate is
/// (spot, strike, time_to_maturity, volatility, interest_rate).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricingInputs {
    /// Current underlying price. Must be > 0.
    #[serde(rename = "current_price", alias = "spot")]
    pub spot: f64,
    /// Must be > 0.
    pub strike: f64,
    /// Years. Must be >= 0; exactly 0 is degenerate.
    pub time_to_maturity: f64,
    /// Annualised. Must be >= 0; exactly 0 is degenerate.
    pub volatility: f64,
    /// Continuously compounded risk-free rate. Any finite value.
    pub interest_rate: f64,
}

impl PricingInputs {
    pub const FIELD_NAMES: [&'static str; 5] = [
        "current_price",
        "strike",
        "time_to_maturity",
        "volatility",
        "interest_rate",
    ];

    pub fn new(
        spot: f64,
        strike: f64,
        time_to_maturity: f64,
        volatility: f64,
        interest_rate: f64,
    ) -> Self {
        Self {
            spot,
            strike,
            time_to_maturity,
            volatility,
            interest_rate,
        }
    }

    /// Copy of these inputs with spot and volatility replaced (one grid cell).
    #[inline]
    pub fn with_spot_vol(&self, spot: f64, volatility: f64) -> Self {
        Self {
            spot,
            volatility,
            ..*self
        }
    }

    /// Flat name -> value view, in `FIELD_NAMES` order.
    pub fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("current_price", self.spot),
            ("strike", self.strike),
            ("time_to_maturity", self.time_to_maturity),
            ("volatility", self.volatility),
            ("interest_rate", self.interest_rate),
        ]
    }

    /// Checks the input domain.
    ///
    /// Non-finite values, spot/strike <= 0, negative volatility and negative
    /// maturity are `InvalidInput`. Zero maturity or zero volatility are
    /// `DegenerateInputs`: d1/d2 are undefined there.
    pub fn validate(&self) -> Result<(), PricingError> {
        for (field, value) in self.fields() {
            if !value.is_finite() {
                return Err(PricingError::invalid(field, value, "must be finite"));
            }
        }
        if self.spot <= 0.0 {
            return Err(PricingError::invalid("current_price", self.spot, "must be > 0"));
        }
        if self.strike <= 0.0 {
            return Err(PricingError::invalid("strike", self.strike, "must be > 0"));
        }
        if self.volatility < 0.0 {
            return Err(PricingError::invalid("volatility", self.volatility, "must be >= 0"));
        }
        if self.time_to_maturity < 0.0 {
            return Err(PricingError::invalid(
                "time_to_maturity",
                self.time_to_maturity,
                "must be >= 0",
            ));
        }
        if self.time_to_maturity == 0.0 {
            return Err(PricingError::DegenerateInputs(
                "time_to_maturity is zero".into(),
            ));
        }
        if self.volatility == 0.0 {
            return Err(PricingError::DegenerateInputs("volatility is zero".into()));
        }
        Ok(())
    }
}

/// Prices and Greeks for the call and the put on the same inputs.
///
/// Units: theta is per year, rho per unit of rate, and vega is the raw
/// derivative per unit of volatility (multiply by 0.01 for a 1-vol-point move).
/// Gamma and vega are identical for calls and puts.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricingResult {
    pub call_price: f64,
    pub put_price: f64,
    pub delta_call: f64,
    pub delta_put: f64,
    pub gamma_call: f64,
    pub gamma_put: f64,
    pub vega_call: f64,
    pub vega_put: f64,
    pub theta_call: f64,
    pub theta_put: f64,
    pub rho_call: f64,
    pub rho_put: f64,
}

impl PricingResult {
    pub const FIELD_NAMES: [&'static str; 12] = [
        "call_price",
        "put_price",
        "delta_call",
        "delta_put",
        "gamma_call",
        "gamma_put",
        "vega_call",
        "vega_put",
        "theta_call",
        "theta_put",
        "rho_call",
        "rho_put",
    ];

    /// Flat name -> value view, in `FIELD_NAMES` order.
    pub fn fields(&self) -> [(&'static str, f64); 12] {
        [
            ("call_price", self.call_price),
            ("put_price", self.put_price),
            ("delta_call", self.delta_call),
            ("delta_put", self.delta_put),
            ("gamma_call", self.gamma_call),
            ("gamma_put", self.gamma_put),
            ("vega_call", self.vega_call),
            ("vega_put", self.vega_put),
            ("theta_call", self.theta_call),
            ("theta_put", self.theta_put),
            ("rho_call", self.rho_call),
            ("rho_put", self.rho_put),
        ]
    }

    fn ensure_finite(&self) -> Result<(), PricingError> {
        match self.fields().iter().find(|(_, v)| !v.is_finite()) {
            Some((name, v)) => Err(PricingError::DegenerateInputs(format!(
                "{name} evaluated to {v}"
            ))),
            None => Ok(()),
        }
    }
}

#[inline]
fn standard_normal() -> Normal {
    Normal::standard()
}

/// Standard normal CDF.
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    standard_normal().cdf(x)
}

/// Standard normal density.
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    standard_normal().pdf(x)
}

/// d1 and d2 of the Black-Scholes formula, after input validation.
pub fn d1_d2(inputs: &PricingInputs) -> Result<(f64, f64), PricingError> {
    inputs.validate()?;
    let sigma_sqrt_t = inputs.volatility * inputs.time_to_maturity.sqrt();
    if sigma_sqrt_t == 0.0 {
        return Err(PricingError::DegenerateInputs(
            "volatility * sqrt(time_to_maturity) underflows to zero".into(),
        ));
    }
    Ok(d1_d2_unchecked(inputs, sigma_sqrt_t))
}

#[inline]
fn d1_d2_unchecked(inputs: &PricingInputs, sigma_sqrt_t: f64) -> (f64, f64) {
    let half_sigma_sq = 0.5 * inputs.volatility * inputs.volatility;
    let d1 = ((inputs.spot / inputs.strike).ln()
        + (inputs.interest_rate + half_sigma_sq) * inputs.time_to_maturity)
        / sigma_sqrt_t;
    (d1, d1 - sigma_sqrt_t)
}

/// Black-Scholes-Merton European call/put prices and Greeks, no dividends.
///
/// Pure and stateless. Fails with `InvalidInput` outside the input domain and
/// with `DegenerateInputs` at zero maturity, zero volatility, or whenever any
/// output would be non-finite.
pub fn price(inputs: &PricingInputs) -> Result<PricingResult, PricingError> {
    let (d1, d2) = d1_d2(inputs)?;

    let PricingInputs {
        spot,
        strike,
        time_to_maturity: t,
        volatility: sigma,
        interest_rate: r,
    } = *inputs;

    let normal = standard_normal();
    let cdf_d1 = normal.cdf(d1);
    let cdf_d2 = normal.cdf(d2);
    let cdf_neg_d1 = normal.cdf(-d1);
    let cdf_neg_d2 = normal.cdf(-d2);
    let pdf_d1 = normal.pdf(d1);

    let sqrt_t = t.sqrt();
    let discounted_strike = strike * (-r * t).exp();

    let gamma = pdf_d1 / (spot * sigma * sqrt_t);
    let vega = spot * pdf_d1 * sqrt_t;
    let decay = -(spot * pdf_d1 * sigma) / (2.0 * sqrt_t);

    let result = PricingResult {
        call_price: spot * cdf_d1 - discounted_strike * cdf_d2,
        put_price: discounted_strike * cdf_neg_d2 - spot * cdf_neg_d1,
        delta_call: cdf_d1,
        delta_put: cdf_d1 - 1.0,
        gamma_call: gamma,
        gamma_put: gamma,
        vega_call: vega,
        vega_put: vega,
        theta_call: decay - r * discounted_strike * cdf_d2,
        theta_put: decay + r * discounted_strike * cdf_neg_d2,
        rho_call: t * discounted_strike * cdf_d2,
        rho_put: -t * discounted_strike * cdf_neg_d2,
    };

    result.ensure_finite()?;
    Ok(result)
}
