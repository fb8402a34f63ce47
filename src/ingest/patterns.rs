//! Curated pattern library for the entity extractor.
//!
//! Phrase lists for product and term recognition, plus the alias table
//! that folds product variants onto canonical identifiers. Phrases are
//! matched case-insensitively as whole words, with an optional plural
//! on the final word.

/// Product phrases. Matched at confidence 0.85.
pub const PRODUCT_PATTERNS: &[&str] = &[
    // FX forwards and variants
    "fx forward",
    "foreign exchange forward",
    "currency forward",
    "currency forward contract",
    "forward exchange contract",
    "forward contract",
    "deliverable forward",
    "non-deliverable forward",
    "participating forward",
    "participating forward contract",
    "range forward",
    "range forward contract",
    "window forward",
    "target forward",
    "target forward contract",
    "target redemption forward",
    "pivot target forward",
    "bonus forward",
    "bonus forward contract",
    "flexible forward",
    "ratio forward",
    "knock-in forward",
    "knock-out forward",
    "accumulator",
    "decumulator",
    // FX and currency options
    "fx option",
    "foreign exchange option",
    "currency option",
    "vanilla option",
    "barrier option",
    "knock-in option",
    "knock-out option",
    "asian option",
    "digital option",
    "binary option",
    "basket option",
    "lookback option",
    "compound option",
    "quanto option",
    "seagull option",
    "risk reversal",
    "straddle",
    "strangle",
    "butterfly spread",
    "calendar spread",
    // Swaps
    "fx swap",
    "foreign exchange swap",
    "currency swap",
    "cross currency swap",
    "cross currency basis swap",
    "interest rate swap",
    "basis swap",
    "overnight index swap",
    "asset swap",
    "total return swap",
    "inflation swap",
    "commodity swap",
    "equity swap",
    "callable swap",
    "cancellable swap",
    "amortising swap",
    "extendable swap",
    "forward start swap",
    "zero coupon swap",
    "swaption",
    "payer swaption",
    "receiver swaption",
    "forward rate agreement",
    // Rate protection
    "interest rate cap",
    "interest rate floor",
    "interest rate collar",
    "zero cost collar",
    "fx collar",
    // Deposits and investments
    "term deposit",
    "fixed term deposit",
    "notice deposit",
    "call deposit",
    "at call deposit",
    "callable deposit",
    "dual currency deposit",
    "dual currency investment",
    "structured deposit",
    "structured investment",
    "structured product",
    "structured note",
    "capital protected investment",
    "principal protected note",
    "equity linked note",
    "credit linked note",
    "range accrual note",
    "autocallable note",
    "reverse convertible",
    "power reverse dual currency note",
    // Debt securities
    "floating rate note",
    "fixed rate note",
    "medium term note",
    "commercial paper",
    "treasury bill",
    "government bond",
    "corporate bond",
    "covered bond",
    "green bond",
    "convertible bond",
    "subordinated note",
    "bank bill",
    "negotiable certificate of deposit",
    "certificate of deposit",
    "repurchase agreement",
    "reverse repurchase agreement",
    "securities lending",
    // Accounts and facilities
    "foreign currency account",
    "multi currency account",
    "multi-currency account",
    "transaction account",
    "offset account",
    "cash management account",
    "precious metals account",
    "term loan",
    "margin loan",
    "revolving credit facility",
    "overdraft facility",
    "trade finance facility",
    "letter of credit",
    "standby letter of credit",
    "bank guarantee",
    "documentary collection",
    "invoice financing",
    "supply chain finance",
    "equipment finance",
    "asset finance",
    "hire purchase",
    "finance lease",
    "operating lease",
    // Lending
    "home loan",
    "fixed rate home loan",
    "variable rate home loan",
    "interest only loan",
    "bridging loan",
    "construction loan",
    "personal loan",
    "credit card",
    "merchant facility",
    // Payments
    "telegraphic transfer",
    "international money transfer",
    "direct debit",
    "foreign exchange spot",
    "spot contract",
    // Commodities
    "gold forward",
    "commodity option",
    "commodity forward",
    "carbon credit forward",
    // Funds and listed products
    "managed fund",
    "exchange traded fund",
    "listed investment company",
    "superannuation fund",
    "annuity",
    "life insurance bond",
    "unit trust",
    "cash trust",
    "mortgage fund",
    "hybrid security",
    "preference share",
    "capital note",
    "perpetual note",
    "contingent convertible",
    "warrant",
    "instalment warrant",
    "contract for difference",
    "futures contract",
    "bond future",
    "bank bill future",
    "index future",
    "equity option",
    "index option",
];

/// Domain term phrases. Matched at confidence 0.85.
pub const TERM_PATTERNS: &[&str] = &[
    // Rates and prices
    "spot rate",
    "forward rate",
    "forward points",
    "strike price",
    "strike rate",
    "exercise price",
    "premium",
    "option premium",
    "interest rate",
    "fixed rate",
    "floating rate",
    "reference rate",
    "benchmark rate",
    "base rate",
    "cash rate",
    "swap rate",
    "coupon",
    "coupon rate",
    "yield",
    "yield to maturity",
    "discount rate",
    "discount factor",
    "accrued interest",
    "day count convention",
    "basis points",
    "spread",
    "bid-ask spread",
    "bid price",
    "ask price",
    "offer price",
    "mid rate",
    "exchange rate",
    "cross rate",
    "conversion rate",
    "revaluation rate",
    "effective rate",
    "nominal rate",
    "annual percentage rate",
    "comparison rate",
    "introductory rate",
    "standard variable rate",
    "screen rate",
    "simple interest",
    "compound interest",
    "compounding",
    "interpolation",
    // Amounts and principal
    "notional amount",
    "principal amount",
    "face value",
    "settlement amount",
    "minimum investment",
    "minimum deposit",
    "maximum exposure",
    "credit limit",
    "trading limit",
    "settlement limit",
    "facility limit",
    "retention amount",
    // Dates and tenor
    "maturity date",
    "settlement date",
    "value date",
    "trade date",
    "expiry date",
    "exercise date",
    "delivery date",
    "fixing date",
    "reset date",
    "rollover",
    "rollover date",
    "tenor",
    "termination date",
    "ex dividend date",
    "record date",
    "payment date",
    "grace period",
    "cooling off period",
    "business day",
    "business day convention",
    // Margin and collateral
    "margin",
    "initial margin",
    "variation margin",
    "margin call",
    "margin requirement",
    "collateral",
    "haircut",
    "mark to market",
    "credit support annex",
    // Valuation
    "present value",
    "net present value",
    "fair value",
    "intrinsic value",
    "time value",
    "volatility",
    "implied volatility",
    "historical volatility",
    "delta",
    "gamma",
    "vega",
    "theta",
    "value at risk",
    "expected shortfall",
    // Hedging and exposure
    "hedge",
    "hedging",
    "hedge ratio",
    "exposure",
    "currency exposure",
    "interest rate exposure",
    "credit exposure",
    // Risk vocabulary
    "counterparty risk",
    "credit risk",
    "market risk",
    "liquidity risk",
    "operational risk",
    "settlement risk",
    "basis risk",
    "translation risk",
    "transaction risk",
    "economic risk",
    "sovereign risk",
    "concentration risk",
    // Lifecycle events
    "break cost",
    "break fee",
    "early termination",
    "unwind",
    "novation",
    "assignment",
    "netting",
    "close out netting",
    "set off",
    "drawdown",
    "redraw",
    "prepayment",
    "repayment schedule",
    "amortisation",
    "balloon payment",
    "residual value",
    "default",
    "event of default",
    "cross default",
    "acceleration",
    // Documentation
    "master agreement",
    "isda agreement",
    "confirmation",
    "term sheet",
    "product disclosure statement",
    "information memorandum",
    "prospectus",
    "eligibility criteria",
    "financial covenant",
    "undertaking",
    "representation",
    "warranty",
    "force majeure",
    "market disruption",
    "disruption event",
    // Fees and charges
    "establishment fee",
    "application fee",
    "annual fee",
    "account keeping fee",
    "transaction fee",
    "service fee",
    "management fee",
    "performance fee",
    "exit fee",
    "early withdrawal fee",
    "break funding cost",
    "line fee",
    "commitment fee",
    "utilisation fee",
    "arrangement fee",
    "brokerage",
    "commission",
    "stamp duty",
    "withholding tax",
    // Returns and distributions
    "franking credit",
    "capital gain",
    "capital loss",
    "distribution",
    "dividend",
    "dividend yield",
    // Security and enforcement
    "security interest",
    "charge",
    "mortgage",
    "guarantee",
    "indemnity",
    "covenant",
    "enforcement",
    // Parties and roles
    "calculation agent",
    "paying agent",
    "custodian",
    "trustee",
    "nominee",
    "beneficial owner",
    "authorised signatory",
    "power of attorney",
    // Compliance
    "know your customer",
    "anti money laundering",
    "sanctions screening",
    "credit assessment",
    "credit rating",
    "investment grade",
    "speculative grade",
    "risk weight",
    "capital adequacy",
    "liquidity coverage",
    "leverage ratio",
    "stress test",
    "scenario analysis",
    "sensitivity analysis",
    // Settlement mechanics
    "cash settlement",
    "physical settlement",
    "deliverable",
    "non-deliverable",
    "fixing source",
    "currency pair",
    "base currency",
    "quote currency",
    "terms currency",
    // Cash management
    "sweep facility",
    "pooling arrangement",
    "notional pooling",
    "target balance",
    "escrow",
    "standing order",
    "direct credit",
    "offset benefit",
    "redraw facility",
];

/// Product alias groups: each alias (already normalized) folds onto the
/// canonical identifier in the first position.
pub const PRODUCT_ALIASES: &[(&str, &[&str])] = &[
    (
        "fx_forward",
        &[
            "fx forward",
            "foreign exchange forward",
            "currency forward",
            "currency forward contract",
            "forward exchange contract",
            "deliverable forward",
        ],
    ),
    (
        "fx_option",
        &["fx option", "foreign exchange option", "currency option", "fxo"],
    ),
    ("fx_swap", &["fx swap", "foreign exchange swap"]),
    (
        "cross_currency_swap",
        &["cross currency swap", "currency swap", "cross currency basis swap"],
    ),
    ("interest_rate_swap", &["interest rate swap", "irs"]),
    ("term_deposit", &["term deposit", "fixed term deposit", "td"]),
    (
        "dual_currency_investment",
        &["dual currency investment", "dual currency deposit", "dci"],
    ),
    (
        "foreign_currency_account",
        &[
            "foreign currency account",
            "multi currency account",
            "multi-currency account",
            "fca",
        ],
    ),
    (
        "participating_forward",
        &["participating forward", "participating forward contract", "pfc"],
    ),
    (
        "range_forward",
        &["range forward", "range forward contract", "rfc"],
    ),
    (
        "target_forward",
        &[
            "target forward",
            "target forward contract",
            "target redemption forward",
            "tfc",
        ],
    ),
    (
        "bonus_forward",
        &["bonus forward", "bonus forward contract", "bcf"],
    ),
    ("interest_rate_cap", &["interest rate cap", "rate cap"]),
    ("interest_rate_floor", &["interest rate floor", "rate floor"]),
    (
        "interest_rate_collar",
        &["interest rate collar", "zero cost collar", "fx collar", "collar"],
    ),
    ("swaption", &["swaption", "swap option"]),
    ("callable_swap", &["callable swap", "cancellable swap"]),
    ("forward_rate_agreement", &["forward rate agreement", "fra"]),
    (
        "non_deliverable_forward",
        &["non-deliverable forward", "non deliverable forward", "ndf"],
    ),
    (
        "overnight_index_swap",
        &["overnight index swap", "ois"],
    ),
];

/// Look up the canonical product id for a normalized phrase.
pub fn canonical_product(normalized: &str) -> Option<&'static str> {
    for (canonical, aliases) in PRODUCT_ALIASES {
        if aliases.contains(&normalized) {
            return Some(canonical);
        }
    }
    None
}
