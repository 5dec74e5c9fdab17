//! Fixed extraction brief sent with every transcript.

/// Instructions describing the building-level output schema.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You track building-level interactions between a rental agent and one client.
From the client's message history below, extract one object per building mentioned.

Statuses:
- "sent": the building was shared with or recommended to the client
- "scheduled": a tour is booked but has not happened yet
- "toured": the client visited the building
- "rejected": the client turned the building down (give the reason)
- "cancelled": a booked tour was called off
- "replaced": the client asked for a different building instead (name it)

Tour type:
- "In-Person Tour" when a group chat was created for the tour
- "Virtual Tour" when no group chat was created
- "Self Guided Tour" or "Videos Only" only when stated explicitly

Fields for each object:
- building_name
- sent_at: ISO 8601 timestamp of the earliest mention
- sent_method: "Call", "Email", "Text", "Website" or "Guest Card"
- tour_status: one of the statuses above
- tour_completed: true only if the tour took place
- tour_type
- tour_scheduled_at: ISO 8601 timestamp of the tour, if scheduled
- tour_booked_at: ISO 8601 timestamp of when the tour was booked
- booking_method: "Call", "Email" or "Online"
- actions: list of interaction types, e.g. ["Call", "Guest Card", "Website", "Email"]
- rejected, rejection_reason, replaced_by
- address, price, contact_name, contact_phone, contact_email when stated
- notes: anything else about cancellations or replacements

Do not produce objects for:
- general property inquiries or apartment searches
- a tour itinerary as a whole (emit one object per building on it)
- interaction summaries
- demographic or profile data about the client

Write "Not mentioned" for anything the messages do not state.
Reply with a single JSON list and nothing else, for example:
[
  {
    "building_name": "The Parker",
    "sent_at": "2025-04-23T21:28:22+00:00",
    "sent_method": "Call",
    "tour_status": "toured",
    "tour_completed": true,
    "tour_type": "In-Person Tour",
    "tour_scheduled_at": "2025-04-26T10:00:00-05:00",
    "booking_method": "Call",
    "actions": ["Guest Card", "Call"],
    "notes": "Not mentioned"
  }
]"#;
