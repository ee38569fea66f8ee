//! Validated, immutable value objects produced by the domain mapper.
//!
//! Every factory is strict: scores outside `[0, 1]` are rejected with a
//! [`ValidationError`]. Normalisation of sloppy model output happens in
//! [`crate::mapper`] before these constructors are called.

use serde::Serialize;
use serde_json::{json, Value};

use super::analysis::{SentimentCategory, Urgency};
use super::error::ValidationError;

/// Severity at or above which a pain point is critical.
pub const CRITICAL_SEVERITY: f64 = 0.7;
/// Severity at or above which a pain point is moderate.
pub const MODERATE_SEVERITY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sentiment {
    category: SentimentCategory,
    confidence: f64,
}

impl Sentiment {
    pub fn new(category: SentimentCategory, confidence: f64) -> Result<Self, ValidationError> {
        let confidence = ValidationError::check_unit("sentiment.confidence", confidence)?;
        Ok(Self {
            category,
            confidence,
        })
    }

    /// Sentiment with zero confidence, for records without a usable score.
    pub fn unscored(category: SentimentCategory) -> Self {
        Self {
            category,
            confidence: 0.0,
        }
    }

    pub fn category(&self) -> SentimentCategory {
        self.category
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "category": self.category.as_str(),
            "confidence": self.confidence,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKind {
    Joy,
    Satisfaction,
    Gratitude,
    Trust,
    Surprise,
    Anticipation,
    Confusion,
    Frustration,
    Anger,
    Sadness,
    Fear,
    Disappointment,
    Other,
}

impl EmotionKind {
    /// Map a model label to a kind; unrecognised labels become [`EmotionKind::Other`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "joy" | "happiness" | "alegria" | "alegría" | "felicidad" => Self::Joy,
            "satisfaction" | "satisfaccion" | "satisfacción" | "contentment" => {
                Self::Satisfaction
            }
            "gratitude" | "gratitud" | "agradecimiento" => Self::Gratitude,
            "trust" | "confianza" => Self::Trust,
            "surprise" | "sorpresa" => Self::Surprise,
            "anticipation" | "expectativa" | "anticipacion" | "anticipación" => {
                Self::Anticipation
            }
            "confusion" | "confusión" => Self::Confusion,
            "frustration" | "frustracion" | "frustración" => Self::Frustration,
            "anger" | "enojo" | "ira" | "rabia" => Self::Anger,
            "sadness" | "tristeza" => Self::Sadness,
            "fear" | "miedo" | "preocupacion" | "preocupación" | "worry" => Self::Fear,
            "disappointment" | "decepcion" | "decepción" => Self::Disappointment,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Satisfaction => "satisfaction",
            Self::Gratitude => "gratitude",
            Self::Trust => "trust",
            Self::Surprise => "surprise",
            Self::Anticipation => "anticipation",
            Self::Confusion => "confusion",
            Self::Frustration => "frustration",
            Self::Anger => "anger",
            Self::Sadness => "sadness",
            Self::Fear => "fear",
            Self::Disappointment => "disappointment",
            Self::Other => "other",
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::Confusion
                | Self::Frustration
                | Self::Anger
                | Self::Sadness
                | Self::Fear
                | Self::Disappointment
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Emotion {
    kind: EmotionKind,
    intensity: f64,
    confidence: f64,
}

impl Emotion {
    pub fn new(kind: EmotionKind, intensity: f64, confidence: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            kind,
            intensity: ValidationError::check_unit("emotion.intensity", intensity)?,
            confidence: ValidationError::check_unit("emotion.confidence", confidence)?,
        })
    }

    pub fn kind(&self) -> EmotionKind {
        self.kind
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "intensity": self.intensity,
            "confidence": self.confidence,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeCategory {
    Service,
    CustomerSupport,
    Product,
    Quality,
    Price,
    Delivery,
    Usability,
    Communication,
    Staff,
    Facilities,
    Other,
}

impl ThemeCategory {
    /// Map a model label to a category; unrecognised labels become [`ThemeCategory::Other`].
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "service" | "servicio" | "atencion" | "atención" => Self::Service,
            "customer_support" | "support" | "soporte" | "atencion_al_cliente"
            | "atención_al_cliente" => Self::CustomerSupport,
            "product" | "producto" => Self::Product,
            "quality" | "calidad" => Self::Quality,
            "price" | "pricing" | "precio" | "costo" | "cost" => Self::Price,
            "delivery" | "shipping" | "entrega" | "envio" | "envío" | "despacho" => Self::Delivery,
            "usability" | "usabilidad" | "experience" | "experiencia" => Self::Usability,
            "communication" | "comunicacion" | "comunicación" => Self::Communication,
            "staff" | "personal" | "employees" | "empleados" => Self::Staff,
            "facilities" | "instalaciones" | "infrastructure" | "infraestructura" => {
                Self::Facilities
            }
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::CustomerSupport => "customer_support",
            Self::Product => "product",
            Self::Quality => "quality",
            Self::Price => "price",
            Self::Delivery => "delivery",
            Self::Usability => "usability",
            Self::Communication => "communication",
            Self::Staff => "staff",
            Self::Facilities => "facilities",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Theme {
    category: ThemeCategory,
    relevance: f64,
    confidence: f64,
}

impl Theme {
    pub fn new(
        category: ThemeCategory,
        relevance: f64,
        confidence: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            category,
            relevance: ValidationError::check_unit("theme.relevance", relevance)?,
            confidence: ValidationError::check_unit("theme.confidence", confidence)?,
        })
    }

    pub fn category(&self) -> ThemeCategory {
        self.category
    }

    pub fn relevance(&self) -> f64 {
        self.relevance
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "category": self.category.as_str(),
            "relevance": self.relevance,
            "confidence": self.confidence,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PainPointKind {
    WaitTime,
    PoorService,
    ProductDefect,
    Billing,
    Communication,
    Availability,
    Usability,
    Other,
}

impl PainPointKind {
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "wait_time" | "waiting" | "delay" | "delays" | "tiempo_de_espera" | "demora"
            | "espera" => Self::WaitTime,
            "poor_service" | "bad_service" | "mala_atencion" | "mala_atención" | "mal_servicio" => {
                Self::PoorService
            }
            "product_defect" | "defect" | "falla" | "defecto" | "producto_defectuoso" => {
                Self::ProductDefect
            }
            "billing" | "pricing" | "cobro" | "facturacion" | "facturación" | "precio" => {
                Self::Billing
            }
            "communication" | "comunicacion" | "comunicación" | "information" | "informacion" => {
                Self::Communication
            }
            "availability" | "stock" | "disponibilidad" => Self::Availability,
            "usability" | "usabilidad" | "complexity" | "complejidad" => Self::Usability,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitTime => "wait_time",
            Self::PoorService => "poor_service",
            Self::ProductDefect => "product_defect",
            Self::Billing => "billing",
            Self::Communication => "communication",
            Self::Availability => "availability",
            Self::Usability => "usability",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Moderate,
    Critical,
}

impl ImpactLevel {
    /// Impact bucket for a severity already known to be in `[0, 1]`.
    pub fn for_severity(severity: f64) -> Self {
        if severity >= CRITICAL_SEVERITY {
            Self::Critical
        } else if severity >= MODERATE_SEVERITY {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PainPoint {
    kind: PainPointKind,
    severity: f64,
    confidence: f64,
    impact: ImpactLevel,
}

impl PainPoint {
    /// Build a pain point; the impact level is derived from `severity`, so every
    /// severity in `[0, 1]` lands in exactly one bucket.
    pub fn new(kind: PainPointKind, severity: f64, confidence: f64) -> Result<Self, ValidationError> {
        let severity = ValidationError::check_unit("pain_point.severity", severity)?;
        Ok(Self {
            kind,
            severity,
            confidence: ValidationError::check_unit("pain_point.confidence", confidence)?,
            impact: ImpactLevel::for_severity(severity),
        })
    }

    pub fn kind(&self) -> PainPointKind {
        self.kind
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn impact(&self) -> ImpactLevel {
        self.impact
    }

    pub fn is_critical(&self) -> bool {
        self.impact == ImpactLevel::Critical
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "severity": self.severity,
            "confidence": self.confidence,
            "impact": self.impact.as_str(),
        })
    }
}

/// Validated analysis of a single comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainAnalysis {
    sentiment: Sentiment,
    emotions: Vec<Emotion>,
    themes: Vec<Theme>,
    pain_points: Vec<PainPoint>,
    urgency: Option<Urgency>,
}

impl DomainAnalysis {
    pub fn new(
        sentiment: Sentiment,
        emotions: Vec<Emotion>,
        themes: Vec<Theme>,
        pain_points: Vec<PainPoint>,
        urgency: Option<Urgency>,
    ) -> Self {
        Self {
            sentiment,
            emotions,
            themes,
            pain_points,
            urgency,
        }
    }

    pub fn sentiment(&self) -> &Sentiment {
        &self.sentiment
    }

    pub fn emotions(&self) -> &[Emotion] {
        &self.emotions
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn pain_points(&self) -> &[PainPoint] {
        &self.pain_points
    }

    pub fn urgency(&self) -> Option<Urgency> {
        self.urgency
    }

    /// Strongest emotion by intensity.
    pub fn dominant_emotion(&self) -> Option<&Emotion> {
        self.emotions
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }

    pub fn has_critical_pain_point(&self) -> bool {
        self.pain_points.iter().any(PainPoint::is_critical)
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "sentiment": self.sentiment.to_dict(),
            "emotions": self.emotions.iter().map(Emotion::to_dict).collect::<Vec<_>>(),
            "themes": self.themes.iter().map(Theme::to_dict).collect::<Vec<_>>(),
            "pain_points": self.pain_points.iter().map(PainPoint::to_dict).collect::<Vec<_>>(),
            "urgency": self.urgency.map(|u| u.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_rejects_out_of_range_confidence() {
        assert!(Sentiment::new(SentimentCategory::Positive, 1.01).is_err());
        assert!(Sentiment::new(SentimentCategory::Positive, -0.01).is_err());
        assert!(Sentiment::new(SentimentCategory::Positive, f64::NAN).is_err());
        let s = Sentiment::new(SentimentCategory::Negative, 0.8).unwrap();
        assert_eq!(s.category(), SentimentCategory::Negative);
    }

    #[test]
    fn test_pain_point_critical_boundary() {
        let at = PainPoint::new(PainPointKind::WaitTime, 0.7, 0.9).unwrap();
        assert!(at.is_critical());
        assert_eq!(at.impact(), ImpactLevel::Critical);

        let below = PainPoint::new(PainPointKind::WaitTime, 0.69999, 0.9).unwrap();
        assert!(!below.is_critical());
        assert_eq!(below.impact(), ImpactLevel::Moderate);
    }

    #[test]
    fn test_impact_buckets_cover_unit_interval() {
        assert_eq!(ImpactLevel::for_severity(0.0), ImpactLevel::Low);
        assert_eq!(ImpactLevel::for_severity(0.39), ImpactLevel::Low);
        assert_eq!(ImpactLevel::for_severity(0.4), ImpactLevel::Moderate);
        assert_eq!(ImpactLevel::for_severity(1.0), ImpactLevel::Critical);
    }

    #[test]
    fn test_unknown_labels_fall_back_to_other() {
        assert_eq!(EmotionKind::from_label("nostalgia"), EmotionKind::Other);
        assert_eq!(ThemeCategory::from_label("parking"), ThemeCategory::Other);
        assert_eq!(PainPointKind::from_label("???"), PainPointKind::Other);
        assert_eq!(ThemeCategory::from_label("Customer Support"), ThemeCategory::CustomerSupport);
        assert_eq!(PainPointKind::from_label("tiempo de espera"), PainPointKind::WaitTime);
    }

    #[test]
    fn test_dominant_emotion_and_dict() {
        let analysis = DomainAnalysis::new(
            Sentiment::new(SentimentCategory::Negative, 0.9).unwrap(),
            vec![
                Emotion::new(EmotionKind::Frustration, 0.8, 0.9).unwrap(),
                Emotion::new(EmotionKind::Sadness, 0.3, 0.7).unwrap(),
            ],
            vec![],
            vec![PainPoint::new(PainPointKind::WaitTime, 0.75, 0.8).unwrap()],
            Some(Urgency::High),
        );
        assert_eq!(
            analysis.dominant_emotion().map(Emotion::kind),
            Some(EmotionKind::Frustration)
        );
        assert!(analysis.has_critical_pain_point());

        let dict = analysis.to_dict();
        assert_eq!(dict["sentiment"]["category"], "negative");
        assert_eq!(dict["pain_points"][0]["impact"], "critical");
        assert_eq!(dict["urgency"], "high");
    }
}
