//! Per-class detection statistics as a Plotly figure
//!
//! The figure is plain data; the dashboard hands the serialized JSON to
//! `Plotly.newPlot` unchanged.

use crate::types::Detection;
use serde::Serialize;

pub const CHART_TITLE: &str = "Detected traffic sign statistics";
pub const EMPTY_CHART_TEXT: &str = "No traffic signs detected";
const CHART_HEIGHT: u32 = 400;

/// Aggregates for one class, in order of first appearance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStatistics {
    pub class_name: String,
    pub count: usize,
    pub mean_confidence: f32,
}

/// Count and mean confidence per class
pub fn class_statistics(detections: &[Detection]) -> Vec<ClassStatistics> {
    let mut order: Vec<String> = Vec::new();
    let mut sums: Vec<(usize, f64)> = Vec::new();

    for detection in detections {
        let index = match order.iter().position(|name| name == &detection.class_name) {
            Some(index) => index,
            None => {
                order.push(detection.class_name.clone());
                sums.push((0, 0.0));
                order.len() - 1
            }
        };
        sums[index].0 += 1;
        sums[index].1 += detection.confidence as f64;
    }

    order
        .into_iter()
        .zip(sums)
        .map(|(class_name, (count, total))| ClassStatistics {
            class_name,
            count,
            mean_confidence: (total / count as f64) as f32,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub yaxis: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textposition: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub color: &'static str,
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis2: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
}

impl Title {
    fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlaying: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickformat: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub orientation: &'static str,
    pub yanchor: &'static str,
    pub y: f64,
    pub xanchor: &'static str,
    pub x: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub text: String,
    pub xref: &'static str,
    pub yref: &'static str,
    pub x: f64,
    pub y: f64,
    pub showarrow: bool,
}

/// Build the count / mean-confidence chart for `detections`
pub fn create_statistics_chart(detections: &[Detection]) -> Figure {
    if detections.is_empty() {
        return Figure {
            data: Vec::new(),
            layout: Layout {
                annotations: vec![Annotation {
                    text: EMPTY_CHART_TEXT.to_string(),
                    xref: "paper",
                    yref: "paper",
                    x: 0.5,
                    y: 0.5,
                    showarrow: false,
                }],
                ..Layout::default()
            },
        };
    }

    let stats = class_statistics(detections);
    let classes: Vec<String> = stats.iter().map(|s| s.class_name.clone()).collect();
    let counts: Vec<f64> = stats.iter().map(|s| s.count as f64).collect();
    let confidences: Vec<f64> = stats.iter().map(|s| s.mean_confidence as f64).collect();

    let bar = Trace {
        kind: "bar",
        name: "Count".to_string(),
        x: classes.clone(),
        y: counts,
        yaxis: "y",
        mode: None,
        text: Some(stats.iter().map(|s| s.count.to_string()).collect()),
        textposition: Some("outside"),
        marker: Some(Marker {
            color: Some("lightblue"),
            size: None,
        }),
        line: None,
    };

    let mean_line = Trace {
        kind: "scatter",
        name: "Mean confidence".to_string(),
        x: classes,
        y: confidences,
        yaxis: "y2",
        mode: Some("lines+markers"),
        text: None,
        textposition: None,
        marker: Some(Marker { color: None, size: Some(8) }),
        line: Some(Line { color: "red", width: 3 }),
    };

    Figure {
        data: vec![bar, mean_line],
        layout: Layout {
            title: Some(Title::new(CHART_TITLE)),
            xaxis: Some(Axis {
                title: Some(Title::new("Sign type")),
                ..Axis::default()
            }),
            yaxis: Some(Axis {
                title: Some(Title::new("Count")),
                side: Some("left"),
                ..Axis::default()
            }),
            yaxis2: Some(Axis {
                title: Some(Title::new("Mean confidence")),
                side: Some("right"),
                overlaying: Some("y"),
                tickformat: Some(".0%"),
            }),
            legend: Some(Legend {
                orientation: "h",
                yanchor: "bottom",
                y: 1.02,
                xanchor: "right",
                x: 1.0,
            }),
            height: Some(CHART_HEIGHT),
            annotations: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn detection(name: &str, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0, 0, 10, 10),
            confidence,
            class_id: 0,
            class_name: name.to_string(),
        }
    }

    #[test]
    fn test_statistics_first_appearance_order() {
        let detections = vec![
            detection("Stop", 0.9),
            detection("Speed Limit 50", 0.6),
            detection("Stop", 0.7),
        ];
        let stats = class_statistics(&detections);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].class_name, "Stop");
        assert_eq!(stats[0].count, 2);
        assert!((stats[0].mean_confidence - 0.8).abs() < 1e-6);
        assert_eq!(stats[1].class_name, "Speed Limit 50");
        assert_eq!(stats[1].count, 1);
    }

    #[test]
    fn test_empty_chart_has_annotation_only() {
        let figure = create_statistics_chart(&[]);
        assert!(figure.data.is_empty());
        assert_eq!(figure.layout.annotations.len(), 1);
        assert_eq!(figure.layout.annotations[0].text, EMPTY_CHART_TEXT);

        let json = serde_json::to_value(&figure).unwrap();
        assert!(json["layout"].get("title").is_none());
        assert_eq!(json["layout"]["annotations"][0]["showarrow"], false);
    }

    #[test]
    fn test_chart_traces() {
        let figure = create_statistics_chart(&[detection("Red Light", 0.5), detection("Red Light", 1.0)]);
        assert_eq!(figure.data.len(), 2);

        let bar = &figure.data[0];
        assert_eq!(bar.kind, "bar");
        assert_eq!(bar.x, vec!["Red Light".to_string()]);
        assert_eq!(bar.y, vec![2.0]);
        assert_eq!(bar.text, Some(vec!["2".to_string()]));

        let line = &figure.data[1];
        assert_eq!(line.kind, "scatter");
        assert_eq!(line.yaxis, "y2");
        assert!((line.y[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_chart_layout_json() {
        let figure = create_statistics_chart(&[detection("Stop", 0.9)]);
        let json = serde_json::to_value(&figure).unwrap();

        assert_eq!(json["data"][0]["type"], "bar");
        assert_eq!(json["data"][0]["marker"]["color"], "lightblue");
        assert_eq!(json["data"][1]["line"]["width"], 3);
        assert_eq!(json["data"][1]["marker"]["size"], 8);
        assert_eq!(json["layout"]["title"]["text"], CHART_TITLE);
        assert_eq!(json["layout"]["yaxis2"]["tickformat"], ".0%");
        assert_eq!(json["layout"]["yaxis2"]["overlaying"], "y");
        assert_eq!(json["layout"]["legend"]["orientation"], "h");
        assert_eq!(json["layout"]["height"], 400);
        assert!(json["layout"].get("annotations").is_none());
    }
}
