use tracing::info;
use ulid::Ulid;

use crate::limits::AMOUNT_TOLERANCE;
use crate::model::*;
use crate::observability::{self, PAYMENTS_TOTAL};

use super::{Engine, EngineError};

/// Stay cost: nights between check-in and check-out times the nightly rate.
pub fn expected_amount(stay: &Stay, price_per_night: f64) -> f64 {
    stay.nights() as f64 * price_per_night
}

pub(crate) fn check_amount(expected: f64, supplied: f64) -> Result<(), EngineError> {
    // Slack on top of the tolerance absorbs binary rounding of decimal amounts.
    if !supplied.is_finite() || (supplied - expected).abs() > AMOUNT_TOLERANCE + 1e-9 {
        return Err(EngineError::InvalidAmount { expected, supplied });
    }
    Ok(())
}

impl Engine {
    /// Record the single payment for a booking. Status and occupancy are untouched.
    pub async fn pay_for_booking(
        &self,
        booking_id: Ulid,
        amount: f64,
        status: Option<PaymentStatus>,
    ) -> Result<BookingInfo, EngineError> {
        let result = self.settle(booking_id, amount, status).await;
        observability::record_outcome(PAYMENTS_TOTAL, &result);
        result
    }

    async fn settle(
        &self,
        booking_id: Ulid,
        amount: f64,
        status: Option<PaymentStatus>,
    ) -> Result<BookingInfo, EngineError> {
        // The room's write lock is also this booking's exclusive scope.
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if booking.payment.is_some() {
            return Err(EngineError::DuplicatePayment(booking_id));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(EngineError::NotActive {
                id: booking_id,
                status: booking.status,
            });
        }
        if booking.stay.nights() <= 0 {
            return Err(EngineError::InvalidStay {
                check_in: booking.stay.check_in,
                check_out: booking.stay.check_out,
            });
        }

        let expected = expected_amount(&booking.stay, guard.price_per_night);
        check_amount(expected, amount)?;

        let payment = Payment {
            id: Ulid::new(),
            booking_id,
            amount,
            paid_at: self.now(),
            status: status.unwrap_or_default(),
        };
        let payment_id = payment.id;
        let event = Event::PaymentRecorded { room_id, payment };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        info!("payment {payment_id} of {amount:.2} recorded for booking {booking_id}");

        guard
            .booking(booking_id)
            .map(BookingInfo::from)
            .ok_or(EngineError::BookingNotFound(booking_id))
    }
}
